pub mod config;
pub mod html;
pub mod links;
pub mod migrate;
pub mod paths;
pub mod pipeline;
pub mod redirects;
pub mod runtime;
pub mod source;
pub mod store;
