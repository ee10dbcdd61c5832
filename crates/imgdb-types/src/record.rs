use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Normalize a prompt into its canonical comma-joined form.
///
/// Each comma-separated tag is trimmed and the tags are re-joined with a bare
/// comma: `" cat ,  orange"` becomes `"cat,orange"`. Empty tags are kept so
/// that normalization never changes the tag count.
pub fn normalize_tags(prompt: &str) -> String {
    prompt.split(',').map(str::trim).collect::<Vec<_>>().join(",")
}

/// Iterate over the trimmed, non-empty tags of a prompt.
pub fn split_tags(prompt: &str) -> impl Iterator<Item = &str> {
    prompt.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// The semantic fields an [`Identity`] is derived from.
///
/// Changing any of these fields on a stored record rotates its identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub seed: i64,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: i32,
    pub guidance_scale: f64,
}

impl GenerationParams {
    /// Create parameters, normalizing both prompts.
    pub fn new(
        seed: i64,
        prompt: &str,
        negative_prompt: &str,
        width: u32,
        height: u32,
        steps: i32,
        guidance_scale: f64,
    ) -> Self {
        Self {
            seed,
            prompt: normalize_tags(prompt),
            negative_prompt: normalize_tags(negative_prompt),
            width,
            height,
            steps,
            guidance_scale,
        }
    }

    /// Sentinel parameters for externally supplied training images.
    pub fn training(width: u32, height: u32) -> Self {
        Self::new(-1, "<train_data>", "<train_data>", width, height, -1, -1.0)
    }

    /// Return a copy with both prompts normalized.
    pub fn normalized(mut self) -> Self {
        self.prompt = normalize_tags(&self.prompt);
        self.negative_prompt = normalize_tags(&self.negative_prompt);
        self
    }
}

/// One catalog row describing a stored image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub identity: Identity,
    pub seed: i64,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: i32,
    pub guidance_scale: f64,
    pub labeled: bool,
    pub label: Option<String>,
}

impl ImageRecord {
    /// Build a fresh, unlabeled record.
    ///
    /// The label defaults to the normalized prompt.
    pub fn new(identity: Identity, params: GenerationParams) -> Self {
        let params = params.normalized();
        Self {
            identity,
            label: Some(params.prompt.clone()),
            labeled: false,
            seed: params.seed,
            prompt: params.prompt,
            negative_prompt: params.negative_prompt,
            width: params.width,
            height: params.height,
            steps: params.steps,
            guidance_scale: params.guidance_scale,
        }
    }

    /// The semantic fields of this record.
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            seed: self.seed,
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            width: self.width,
            height: self.height,
            steps: self.steps,
            guidance_scale: self.guidance_scale,
        }
    }

    /// Overwrite the semantic fields (prompts are normalized).
    pub fn set_params(&mut self, params: GenerationParams) {
        let params = params.normalized();
        self.seed = params.seed;
        self.prompt = params.prompt;
        self.negative_prompt = params.negative_prompt;
        self.width = params.width;
        self.height = params.height;
        self.steps = params.steps;
        self.guidance_scale = params.guidance_scale;
    }

    /// Trimmed, non-empty prompt tags.
    pub fn prompt_tags(&self) -> impl Iterator<Item = &str> {
        split_tags(&self.prompt)
    }

    /// Trimmed, non-empty negative prompt tags.
    pub fn negative_prompt_tags(&self) -> impl Iterator<Item = &str> {
        split_tags(&self.negative_prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{DIGEST_LEN, SALT_LEN};
    use proptest::prelude::*;

    fn id() -> Identity {
        Identity::from_parts([1; SALT_LEN], [2; DIGEST_LEN])
    }

    #[test]
    fn normalize_trims_each_tag() {
        assert_eq!(normalize_tags(" cat ,  orange"), "cat,orange");
        assert_eq!(normalize_tags("cat, orange"), "cat,orange");
        assert_eq!(normalize_tags("single"), "single");
    }

    #[test]
    fn normalize_keeps_empty_tags() {
        assert_eq!(normalize_tags(""), "");
        assert_eq!(normalize_tags("a, ,b"), "a,,b");
    }

    #[test]
    fn split_skips_empty_tags() {
        let tags: Vec<_> = split_tags("a, ,b,").collect();
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[test]
    fn new_params_are_normalized() {
        let p = GenerationParams::new(1, "cat , dog", " blurry", 64, 64, 20, 7.5);
        assert_eq!(p.prompt, "cat,dog");
        assert_eq!(p.negative_prompt, "blurry");
    }

    #[test]
    fn training_params_use_sentinels() {
        let p = GenerationParams::training(512, 256);
        assert_eq!(p.seed, -1);
        assert_eq!(p.steps, -1);
        assert_eq!(p.guidance_scale, -1.0);
        assert_eq!(p.prompt, "<train_data>");
        assert_eq!((p.width, p.height), (512, 256));
    }

    #[test]
    fn record_defaults_label_to_prompt() {
        let r = ImageRecord::new(id(), GenerationParams::new(1, "cat, orange", "", 8, 8, 1, 1.0));
        assert!(!r.labeled);
        assert_eq!(r.label.as_deref(), Some("cat,orange"));
    }

    #[test]
    fn params_roundtrip_through_record() {
        let p = GenerationParams::new(9, "a,b", "c", 32, 16, 30, 5.5);
        let mut r = ImageRecord::new(id(), p.clone());
        assert_eq!(r.params(), p);

        let mut changed = p.clone();
        changed.prompt = "x , y".into();
        r.set_params(changed);
        assert_eq!(r.prompt, "x,y");
        assert_eq!(r.seed, 9);
    }

    #[test]
    fn prompt_tags_iterates_trimmed() {
        let r = ImageRecord::new(id(), GenerationParams::new(1, "cat, orange", "ugly", 8, 8, 1, 1.0));
        assert_eq!(r.prompt_tags().collect::<Vec<_>>(), vec!["cat", "orange"]);
        assert_eq!(r.negative_prompt_tags().collect::<Vec<_>>(), vec!["ugly"]);
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[a-z ,]{0,40}") {
            let once = normalize_tags(&s);
            prop_assert_eq!(normalize_tags(&once), once.clone());
        }

        #[test]
        fn normalize_preserves_tag_count(s in "[a-z ,]{0,40}") {
            prop_assert_eq!(normalize_tags(&s).split(',').count(), s.split(',').count());
        }
    }
}
