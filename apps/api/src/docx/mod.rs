// Document container and preview rendering.
// The zip package is opened once per operation; parts are text in, text out.

pub mod container;
pub mod render;

pub use container::{ContainerError, DocxPackage, PRIMARY_PART};
pub use render::render_docx_html;
