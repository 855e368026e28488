pub mod background;
pub mod compose;
pub mod compositor;
pub mod config;
pub mod decoding;
pub mod element;
pub mod error_codes;
pub mod font_assets;
pub mod interaction;
pub mod manifest;
pub mod pixel_font;
pub mod schema;
pub mod session;
pub mod text_stamp;
pub mod viewport;
