//! Tutorboard Web
//!
//! Browser bindings: the host page drives an iframe through [`HostFrame`],
//! and the page inside the iframe mounts the board with `mountBoard`, which
//! returns a [`BoardHandle`].

pub mod routing;
pub mod style;

#[cfg(target_arch = "wasm32")]
mod board_handle;
#[cfg(target_arch = "wasm32")]
mod canvas2d;
#[cfg(target_arch = "wasm32")]
mod host_frame;
#[cfg(target_arch = "wasm32")]
mod js_backend;
#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(target_arch = "wasm32")]
pub use board_handle::{BoardHandle, mount_board};
#[cfg(target_arch = "wasm32")]
pub use canvas2d::Canvas2dSurface;
#[cfg(target_arch = "wasm32")]
pub use host_frame::HostFrame;
#[cfg(target_arch = "wasm32")]
pub use js_backend::{JsBackend, JsBackendHandle};
