//! Graph pipeline: extract generated code, render it in a sandbox, publish the image

mod extract;
mod publisher;
mod renderer;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use extract::extract_code;
pub use publisher::{ArtifactPublisher, GraphReference, StorageConfig, LOCAL_ROUTE_PREFIX};
pub use renderer::{GraphRenderer, RendererConfig, SandboxedRenderer};
