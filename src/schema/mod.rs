pub mod config;
pub mod fragment;
pub mod persona;
