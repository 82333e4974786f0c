//! Similarity metrics used by the solvers.

pub mod trait_;
pub mod mutual_information;

pub use trait_::Metric;
pub use mutual_information::MattesMutualInformation;
