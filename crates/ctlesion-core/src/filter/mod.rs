pub mod resample;
pub mod intensity;
pub mod mask;
pub mod connected;

pub use resample::ResampleImageFilter;
pub use intensity::{binarize, clamp_intensity, multiply, threshold};
pub use mask::{mask_and, mask_not, subtract};
pub use connected::{label_components, largest_connected_component, ComponentLabels};
