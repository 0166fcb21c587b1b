pub mod band_partition;
pub mod band_pool;
pub mod blurrer_factory;
mod box_kernel;
pub mod parallel_box_blurrer;
