pub mod gallery;
pub mod matcher;
pub mod store;
pub mod vector;

pub use gallery::{EnrollmentGallery, EnrollmentRecord};

pub use matcher::{
    cosine_similarity, Comparison, CosineComparator, MatchDecision, MatchPolicy, MatchingEngine,
    VectorComparator, DEFAULT_SIMILARITY_THRESHOLD,
};

pub use store::{
    EnvStoreDirResolver, FilesystemGalleryStore, GalleryStore, StoreDirResolver, GALLERY_STORE_ENV,
};

pub use vector::{
    ensure_valid_vector, load_feature_file, validate_identity, FeatureFile, FeatureVector,
    Modality, Signature, FACE_DIMS, VOICE_DIMS,
};
