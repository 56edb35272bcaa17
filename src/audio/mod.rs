//! Audio capture, PCM conversion, and mixed output.

pub mod capture;
pub mod output;
pub mod pcm;
