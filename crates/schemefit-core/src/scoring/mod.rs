pub mod adjust;
pub mod combine;
pub mod formula;
pub mod normalize;
pub mod ranking;
pub mod tendency;
pub mod weights;
