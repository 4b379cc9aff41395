//! Configuration section definitions.
//!
//! Each module corresponds to a section in `dotview.toml`:
//!
//! | Module    | TOML Section | Purpose                                  |
//! |-----------|--------------|------------------------------------------|
//! | `preview` | `[preview]`  | Debounce, multiplicity, ready handshake  |
//! | `render`  | `[render]`   | Render engine command and options        |
//! | `serve`   | `[serve]`    | Preview page server                      |

mod preview;
mod render;
mod serve;

pub use preview::PreviewConfig;
pub use render::RenderConfig;
pub use serve::ServeConfig;
