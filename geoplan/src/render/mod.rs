pub mod legend;
pub(crate) mod raster;
pub mod scale_bar;
pub mod style;
pub mod view;

pub use legend::{generate_handles, handles_for, Legend, LegendEntry, LegendHandle};
pub use raster::RenderedImage;
pub use scale_bar::{layout_scale_bar, LocalFrame, PlanarFrame, ScaleBar, TransverseMercatorFrame};
pub use style::{Color, Fill, Marker, MarkerShape, Style};
pub use view::{create_view, ColorBar, MapView, DEFAULT_DPI, DEFAULT_FIGURE_INCHES};
