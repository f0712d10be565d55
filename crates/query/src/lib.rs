pub mod loader;
pub mod view;

pub use loader::{load_view, ViewSource};
pub use view::{edge_label, EdgeDirection, GraphView, Neighbor, NodeDetail};
