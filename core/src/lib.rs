pub mod frame;
pub mod message;

pub const PORT: u16 = 7575;
