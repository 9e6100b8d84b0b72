pub mod frame_queue;
pub mod player;
