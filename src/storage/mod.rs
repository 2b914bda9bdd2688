pub mod label;
pub mod signature_store;

pub use label::normalize_label;
pub use signature_store::{FacialSignature, FileSignatureStore, SignatureSet, SignatureStore};
