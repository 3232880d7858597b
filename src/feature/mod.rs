//! Feature extraction: mel filterbank, MFCC vectors and segment-level
//! spectral descriptors.

pub mod mel;
pub mod mfcc;
pub mod spectral;
