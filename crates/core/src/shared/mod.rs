pub mod constants;
pub mod raster_image;
pub mod server_config;
