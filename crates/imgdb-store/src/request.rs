use imgdb_types::{normalize_tags, GenerationParams, ImageRecord};

use crate::error::{StoreError, StoreResult};

/// Fields supplied to [`ImageStore::put`](crate::ImageStore::put).
///
/// For an insert, `image` and all seven semantic fields are required. For an
/// update, every field is an optional override.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutRequest {
    pub image: Option<Vec<u8>>,
    pub seed: Option<i64>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<i32>,
    pub guidance_scale: Option<f64>,
    pub labeled: Option<bool>,
    pub label: Option<String>,
}

impl PutRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// A complete insert request.
    pub fn insert(image: Vec<u8>, params: GenerationParams) -> Self {
        Self {
            image: Some(image),
            seed: Some(params.seed),
            prompt: Some(params.prompt),
            negative_prompt: Some(params.negative_prompt),
            width: Some(params.width),
            height: Some(params.height),
            steps: Some(params.steps),
            guidance_scale: Some(params.guidance_scale),
            labeled: None,
            label: None,
        }
    }

    pub fn image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn steps(mut self, steps: i32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = Some(guidance_scale);
        self
    }

    pub fn labeled(mut self, labeled: bool) -> Self {
        self.labeled = Some(labeled);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Reject values that have no canonical encoding. `guidance_scale` must be
    /// finite, since NaN and the infinities would hash alike.
    pub fn validate(&self) -> StoreResult<()> {
        match self.guidance_scale {
            Some(value) if !value.is_finite() => Err(StoreError::InvalidField {
                field: "guidance_scale",
                reason: format!("{value} is not a finite number"),
            }),
            _ => Ok(()),
        }
    }

    /// The complete parameters of an insert, or the first missing or invalid
    /// field.
    pub fn params(&self) -> StoreResult<GenerationParams> {
        fn required<T: Clone>(value: &Option<T>, name: &'static str) -> StoreResult<T> {
            value.clone().ok_or(StoreError::MissingField(name))
        }
        let seed = required(&self.seed, "seed")?;
        let prompt = required(&self.prompt, "prompt")?;
        let negative_prompt = required(&self.negative_prompt, "negative_prompt")?;
        let width = required(&self.width, "width")?;
        let height = required(&self.height, "height")?;
        let steps = required(&self.steps, "steps")?;
        let guidance_scale = required(&self.guidance_scale, "guidance_scale")?;
        self.validate()?;
        Ok(GenerationParams::new(
            seed,
            &prompt,
            &negative_prompt,
            width,
            height,
            steps,
            guidance_scale,
        ))
    }

    /// Whether any semantic field is overridden.
    pub fn has_semantic_changes(&self) -> bool {
        self.seed.is_some()
            || self.prompt.is_some()
            || self.negative_prompt.is_some()
            || self.width.is_some()
            || self.height.is_some()
            || self.steps.is_some()
            || self.guidance_scale.is_some()
    }

    /// Apply the semantic overrides to a catalog row. Prompts are normalized.
    pub(crate) fn apply_semantic(&self, record: &mut ImageRecord) {
        if let Some(seed) = self.seed {
            record.seed = seed;
        }
        if let Some(prompt) = &self.prompt {
            record.prompt = normalize_tags(prompt);
        }
        if let Some(negative_prompt) = &self.negative_prompt {
            record.negative_prompt = normalize_tags(negative_prompt);
        }
        if let Some(width) = self.width {
            record.width = width;
        }
        if let Some(height) = self.height {
            record.height = height;
        }
        if let Some(steps) = self.steps {
            record.steps = steps;
        }
        if let Some(guidance_scale) = self.guidance_scale {
            record.guidance_scale = guidance_scale;
        }
    }

    /// Apply the `labeled`/`label` overrides; these never affect identity.
    pub(crate) fn apply_label(&self, record: &mut ImageRecord) {
        if let Some(labeled) = self.labeled {
            record.labeled = labeled;
        }
        if let Some(label) = &self.label {
            record.label = Some(label.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgdb_types::Identity;

    fn params() -> GenerationParams {
        GenerationParams::new(1, "cat", "", 64, 64, 20, 7.5)
    }

    #[test]
    fn insert_request_has_all_params() {
        let req = PutRequest::insert(vec![1, 2, 3], params());
        assert_eq!(req.params().unwrap(), params());
        assert!(req.has_semantic_changes());
    }

    #[test]
    fn missing_fields_are_named_in_order() {
        let req = PutRequest::new().image(vec![0]);
        assert!(matches!(req.params(), Err(StoreError::MissingField("seed"))));

        let req = req.seed(1).prompt("cat").negative_prompt("");
        assert!(matches!(req.params(), Err(StoreError::MissingField("width"))));

        let req = req.size(8, 8).steps(1);
        assert!(matches!(
            req.params(),
            Err(StoreError::MissingField("guidance_scale"))
        ));
    }

    #[test]
    fn non_finite_guidance_is_invalid() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let req = PutRequest::insert(vec![1], params()).guidance_scale(value);
            assert!(matches!(
                req.params(),
                Err(StoreError::InvalidField { field: "guidance_scale", .. })
            ));
            assert!(PutRequest::new().guidance_scale(value).validate().is_err());
        }
        assert!(PutRequest::new().guidance_scale(-2.5).validate().is_ok());
        assert!(PutRequest::new().steps(3).validate().is_ok());
    }

    #[test]
    fn label_only_request_has_no_semantic_changes() {
        let req = PutRequest::new().labeled(true).label("orange cat");
        assert!(!req.has_semantic_changes());
    }

    #[test]
    fn apply_normalizes_prompts() {
        let mut record = ImageRecord::new(Identity::from_parts([0; 16], [0; 32]), params());
        PutRequest::new()
            .prompt(" dog , puppy")
            .steps(30)
            .apply_semantic(&mut record);
        assert_eq!(record.prompt, "dog,puppy");
        assert_eq!(record.steps, 30);
        assert_eq!(record.seed, 1);
    }

    #[test]
    fn apply_label_sets_both_fields() {
        let mut record = ImageRecord::new(Identity::from_parts([0; 16], [0; 32]), params());
        PutRequest::new()
            .labeled(true)
            .label("orange cat")
            .apply_label(&mut record);
        assert!(record.labeled);
        assert_eq!(record.label.as_deref(), Some("orange cat"));
    }
}
