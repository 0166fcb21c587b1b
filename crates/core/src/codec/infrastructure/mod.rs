pub mod png_codec;
