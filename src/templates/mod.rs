//! Template storage and compilation.
//!
//! - [`store::TemplateStore`] maps a (name, persona) pair to raw template
//!   text using the tiered user-override / persona-bundle / default-bundle
//!   hierarchy.
//! - [`compiler::TemplateCompiler`] turns raw text into compiled templates
//!   and caches them by key and content hash.

pub mod compiler;
pub mod error;
pub mod store;

pub use compiler::{CacheKey, CacheStats, CompiledTemplate, TemplateCompiler};
pub use error::TemplateError;
pub use store::{Template, TemplateStore, TemplateTier};

use sha2::{Digest, Sha256};

/// Namespace used for templates that are not scoped to a persona.
pub const GLOBAL_NAMESPACE: &str = "_global";

/// SHA-256 hex digest of a template body.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        let a = content_hash("Hi {{ name }}");
        let b = content_hash("Hi {{ name }}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("Hi {{ name }}!"));
    }
}
