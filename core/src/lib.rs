#![no_std]

pub mod bitmap;
pub mod color;
pub mod firmware;
pub mod preview;
pub mod screen;

extern crate alloc;
