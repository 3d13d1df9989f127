pub mod sensitive;
