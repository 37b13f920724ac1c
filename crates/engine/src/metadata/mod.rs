mod store;

pub use store::MetadataStore;
