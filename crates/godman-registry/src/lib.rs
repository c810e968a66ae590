mod store;

pub use store::{RegistryStore, REGISTRY_FILE_NAME};

#[cfg(test)]
mod tests;
