pub mod linear_algebra;
pub mod masks;

#[cfg(test)]
mod tests;
