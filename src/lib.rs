pub mod clock;
pub mod controller;
pub mod logformat;
pub mod logging;
pub mod pacer;
pub mod priming;
pub mod queue;
pub mod rate;
pub mod sampler;
pub mod shutdown;
