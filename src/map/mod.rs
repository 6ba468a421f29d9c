pub mod atlas;
pub mod geometry;
pub mod gesture;
pub mod layers;
pub mod projection;
pub mod renderer;
pub mod spatial;
pub mod view;
pub mod viewport;

pub use atlas::{Atlas, FeatureId, PolygonFeature, RegionKind};
pub use gesture::{Click, GestureTranslator, ZoomDirection};
pub use layers::MapLayers;
pub use projection::{AlbersUsa, Orthographic, Projection, ScreenTransform};
pub use renderer::{MapRenderer, MarkerIcon, MarkerRenderSpec, Palette, RenderedScene};
pub use view::{MapView, RenderPhase, ViewSettings};
pub use viewport::ViewportState;
