//! Names for ephemeral build resources.

use rand::Rng;

/// Source of unique suffixes for builder images and volumes.
pub trait NameGenerator: Send + Sync {
    fn suffix(&self) -> String;
}

/// Ten random lowercase letters per suffix.
///
/// There is no check against existing resources, so uniqueness is only
/// probabilistic.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNames;

impl NameGenerator for RandomNames {
    fn suffix(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..10).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
    }
}

/// Reference for an ephemeral builder image.
pub fn builder_image_name(suffix: &str) -> String {
    format!("bpack.local/builder/{}", hex::encode(suffix))
}

pub fn layers_volume_name(suffix: &str) -> String {
    format!("bpack-layers-{}", suffix)
}

pub fn app_volume_name(suffix: &str) -> String {
    format!("bpack-app-{}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_suffix_shape() {
        let suffix = RandomNames.suffix();
        assert_eq!(suffix.len(), 10);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_random_suffixes_differ() {
        let names = RandomNames;
        assert_ne!(names.suffix(), names.suffix());
    }

    #[test]
    fn test_resource_names() {
        assert_eq!(builder_image_name("abc"), "bpack.local/builder/616263");
        assert_eq!(layers_volume_name("abc"), "bpack-layers-abc");
        assert_eq!(app_volume_name("abc"), "bpack-app-abc");
    }
}
