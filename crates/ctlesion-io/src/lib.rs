pub mod nifti_io;
pub mod affine_io;
pub mod parameters;
pub mod participants;

pub use nifti_io::{read_nifti, read_volume, write_nifti, write_volume};
pub use affine_io::{read_affine, write_affine};
pub use parameters::ParameterMap;
pub use participants::ParticipantsTable;
