pub mod maskgit;
