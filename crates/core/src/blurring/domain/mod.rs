pub mod image_blurrer;
