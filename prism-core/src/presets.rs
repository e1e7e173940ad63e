//! Static preset tables: short keys mapped to the literal parameters a backend call needs.
//!
//! Open tables never fail: an unknown or missing key resolves to the table's
//! default entry. Closed sets such as [`OutpaintDirection`] parse strictly.

use std::str::FromStr;

use serde::Serialize;

use crate::Error;

pub struct PresetTable<T: 'static> {
    category: &'static str,
    default_key: &'static str,
    entries: &'static [(&'static str, T)],
}

impl<T: 'static> PresetTable<T> {
    pub const fn new(
        category: &'static str,
        default_key: &'static str,
        entries: &'static [(&'static str, T)],
    ) -> Self {
        Self {
            category,
            default_key,
            entries,
        }
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn default_key(&self) -> &'static str {
        self.default_key
    }

    pub fn get(&self, key: &str) -> Option<&'static T> {
        let key = key.trim().to_ascii_lowercase();
        let entries = self.entries;
        entries
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, entry)| entry)
    }

    /// Returns the entry for `key`, or the default entry when `key` is absent or unknown.
    pub fn resolve(&self, key: Option<&str>) -> (&'static str, &'static T) {
        let entries = self.entries;
        let wanted = key.map(str::trim).filter(|k| !k.is_empty());
        if let Some(wanted) = wanted {
            let lowered = wanted.to_ascii_lowercase();
            if let Some((name, entry)) = entries.iter().find(|(name, _)| *name == lowered) {
                return (*name, entry);
            }
            tracing::debug!(
                category = self.category,
                key = wanted,
                fallback = self.default_key,
                "unknown preset key, using default"
            );
        }
        let (name, entry) = entries
            .iter()
            .find(|(name, _)| *name == self.default_key)
            .unwrap_or(&entries[0]);
        (*name, entry)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> {
        let entries = self.entries;
        entries.iter().map(|(name, _)| *name)
    }

    pub fn entries(&self) -> &'static [(&'static str, T)] {
        self.entries
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StylePreset {
    pub name: &'static str,
    pub description: &'static str,
    pub prompt_suffix: &'static str,
    pub negative_prompt: &'static str,
}

impl StylePreset {
    pub fn apply(&self, prompt: &str) -> String {
        if self.prompt_suffix.is_empty() {
            prompt.to_string()
        } else {
            format!("{prompt}, {}", self.prompt_suffix)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelPreset {
    pub id: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ControlNetVariant {
    pub id: &'static str,
    pub description: &'static str,
    pub preprocessor: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SdxlModel {
    pub id: &'static str,
    pub description: &'static str,
    pub memory_requirement: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TextEffect {
    pub description: &'static str,
    /// `{text}` is replaced with the user's text.
    pub template: &'static str,
    pub negative_prompt: &'static str,
}

impl TextEffect {
    pub fn render(&self, text: &str) -> String {
        self.template.replace("{text}", text)
    }
}

const NEGATIVE_COMMON: &str = "low quality, blurry, distorted, watermark, jpeg artifacts";

pub static STYLES: PresetTable<StylePreset> = PresetTable::new(
    "style",
    "none",
    &[
        (
            "none",
            StylePreset {
                name: "None",
                description: "Use the prompt as written",
                prompt_suffix: "",
                negative_prompt: NEGATIVE_COMMON,
            },
        ),
        (
            "photorealistic",
            StylePreset {
                name: "Photorealistic",
                description: "Natural photograph with realistic lighting",
                prompt_suffix: "photorealistic, highly detailed, natural lighting, 8k, DSLR photo",
                negative_prompt: "cartoon, illustration, painting, drawing, low quality, blurry, distorted",
            },
        ),
        (
            "anime",
            StylePreset {
                name: "Anime",
                description: "Japanese animation style",
                prompt_suffix: "anime style, vibrant colors, cel shading, studio quality",
                negative_prompt: "photorealistic, 3d render, low quality, blurry, bad anatomy",
            },
        ),
        (
            "digital-art",
            StylePreset {
                name: "Digital Art",
                description: "Polished digital illustration",
                prompt_suffix: "digital art, trending on artstation, sharp focus, concept art",
                negative_prompt: NEGATIVE_COMMON,
            },
        ),
        (
            "oil-painting",
            StylePreset {
                name: "Oil Painting",
                description: "Classical oil on canvas",
                prompt_suffix: "oil painting, visible brush strokes, canvas texture, classical masterpiece",
                negative_prompt: "photo, digital, low quality, blurry",
            },
        ),
        (
            "watercolor",
            StylePreset {
                name: "Watercolor",
                description: "Soft watercolor wash",
                prompt_suffix: "watercolor painting, soft edges, paper texture, delicate washes",
                negative_prompt: "photo, harsh lines, low quality, blurry",
            },
        ),
        (
            "cyberpunk",
            StylePreset {
                name: "Cyberpunk",
                description: "Neon-lit futuristic city aesthetic",
                prompt_suffix: "cyberpunk, neon lights, futuristic, rain-soaked streets, high contrast",
                negative_prompt: NEGATIVE_COMMON,
            },
        ),
        (
            "fantasy",
            StylePreset {
                name: "Fantasy",
                description: "Epic fantasy illustration",
                prompt_suffix: "fantasy art, epic, magical atmosphere, intricate details, dramatic lighting",
                negative_prompt: NEGATIVE_COMMON,
            },
        ),
        (
            "pencil-sketch",
            StylePreset {
                name: "Pencil Sketch",
                description: "Graphite drawing on paper",
                prompt_suffix: "pencil sketch, graphite, cross hatching, monochrome, paper texture",
                negative_prompt: "color, photo, low quality, blurry",
            },
        ),
        (
            "3d-render",
            StylePreset {
                name: "3D Render",
                description: "Physically based 3D render",
                prompt_suffix: "3d render, octane render, global illumination, subsurface scattering",
                negative_prompt: "flat, 2d, sketch, low quality, blurry",
            },
        ),
        (
            "pixel-art",
            StylePreset {
                name: "Pixel Art",
                description: "Retro 16-bit pixel art",
                prompt_suffix: "pixel art, 16-bit, retro game sprite, limited palette",
                negative_prompt: "photorealistic, smooth gradients, blurry",
            },
        ),
        (
            "cinematic",
            StylePreset {
                name: "Cinematic",
                description: "Film still with dramatic grading",
                prompt_suffix: "cinematic film still, anamorphic lens, dramatic lighting, color graded",
                negative_prompt: NEGATIVE_COMMON,
            },
        ),
    ],
);

pub static ASPECT_RATIOS: PresetTable<AspectRatio> = PresetTable::new(
    "aspect ratio",
    "1:1",
    &[
        ("1:1", AspectRatio { width: 512, height: 512, label: "Square" }),
        ("4:3", AspectRatio { width: 640, height: 480, label: "Standard" }),
        ("3:4", AspectRatio { width: 480, height: 640, label: "Portrait" }),
        ("16:9", AspectRatio { width: 768, height: 432, label: "Widescreen" }),
        ("9:16", AspectRatio { width: 432, height: 768, label: "Story" }),
        ("3:2", AspectRatio { width: 768, height: 512, label: "Photo" }),
        ("2:3", AspectRatio { width: 512, height: 768, label: "Photo portrait" }),
    ],
);

pub static BASE_MODELS: PresetTable<ModelPreset> = PresetTable::new(
    "model",
    "sd-1.5",
    &[
        (
            "sd-1.5",
            ModelPreset {
                id: "runwayml/stable-diffusion-v1-5",
                description: "Stable Diffusion 1.5, general purpose",
            },
        ),
        (
            "sd-2.1",
            ModelPreset {
                id: "stabilityai/stable-diffusion-2-1",
                description: "Stable Diffusion 2.1, 768px native",
            },
        ),
        (
            "openjourney",
            ModelPreset {
                id: "prompthero/openjourney",
                description: "Midjourney-style fine tune",
            },
        ),
        (
            "dreamshaper",
            ModelPreset {
                id: "Lykon/DreamShaper",
                description: "Versatile artistic fine tune",
            },
        ),
    ],
);

pub const INPAINT_MODEL: &str = "runwayml/stable-diffusion-inpainting";
pub const BACKGROUND_MODEL: &str = "briaai/RMBG-1.4";
pub const SDXL_VAE: &str = "madebyollin/sdxl-vae-fp16-fix";

pub static CONTROLNET_VARIANTS: PresetTable<ControlNetVariant> = PresetTable::new(
    "controlnet",
    "canny",
    &[
        (
            "canny",
            ControlNetVariant {
                id: "lllyasviel/sd-controlnet-canny",
                description: "Edge detection for precise structure control",
                preprocessor: "canny",
            },
        ),
        (
            "depth",
            ControlNetVariant {
                id: "lllyasviel/sd-controlnet-depth",
                description: "Depth map for 3D structure awareness",
                preprocessor: "depth",
            },
        ),
        (
            "hed",
            ControlNetVariant {
                id: "lllyasviel/sd-controlnet-hed",
                description: "Holistically-nested edge detection",
                preprocessor: "hed",
            },
        ),
        (
            "mlsd",
            ControlNetVariant {
                id: "lllyasviel/sd-controlnet-mlsd",
                description: "Line detection for architectural images",
                preprocessor: "mlsd",
            },
        ),
        (
            "normal",
            ControlNetVariant {
                id: "lllyasviel/sd-controlnet-normal",
                description: "Normal map for surface details",
                preprocessor: "normal",
            },
        ),
        (
            "openpose",
            ControlNetVariant {
                id: "lllyasviel/sd-controlnet-openpose",
                description: "Human pose detection and control",
                preprocessor: "openpose",
            },
        ),
        (
            "scribble",
            ControlNetVariant {
                id: "lllyasviel/sd-controlnet-scribble",
                description: "Sketch/scribble-based generation",
                preprocessor: "scribble",
            },
        ),
        (
            "seg",
            ControlNetVariant {
                id: "lllyasviel/sd-controlnet-seg",
                description: "Semantic segmentation control",
                preprocessor: "seg",
            },
        ),
    ],
);

pub static SDXL_MODELS: PresetTable<SdxlModel> = PresetTable::new(
    "sdxl",
    "sdxl-base",
    &[
        (
            "sdxl-base",
            SdxlModel {
                id: "stabilityai/stable-diffusion-xl-base-1.0",
                description: "SDXL Base - Highest quality generation",
                memory_requirement: "8GB",
            },
        ),
        (
            "sdxl-refiner",
            SdxlModel {
                id: "stabilityai/stable-diffusion-xl-refiner-1.0",
                description: "SDXL Refiner - Enhances SDXL base output",
                memory_requirement: "8GB",
            },
        ),
    ],
);

pub static TEXT_EFFECTS: PresetTable<TextEffect> = PresetTable::new(
    "text effect",
    "neon",
    &[
        (
            "neon",
            TextEffect {
                description: "Glowing neon tubes",
                template: "the word \"{text}\" written in glowing neon tubes, dark brick wall, vibrant glow, typography",
                negative_prompt: "misspelled, extra letters, blurry, low quality",
            },
        ),
        (
            "fire",
            TextEffect {
                description: "Letters made of flames",
                template: "the word \"{text}\" made of roaring flames, embers, black background, typography",
                negative_prompt: "misspelled, extra letters, blurry, low quality",
            },
        ),
        (
            "gold",
            TextEffect {
                description: "Polished gold lettering",
                template: "the word \"{text}\" in polished 3d gold letters, luxury, studio lighting, typography",
                negative_prompt: "misspelled, extra letters, blurry, low quality",
            },
        ),
        (
            "ice",
            TextEffect {
                description: "Carved ice letters",
                template: "the word \"{text}\" carved from translucent ice, frost, cold blue light, typography",
                negative_prompt: "misspelled, extra letters, blurry, low quality",
            },
        ),
        (
            "graffiti",
            TextEffect {
                description: "Spray-painted street art",
                template: "the word \"{text}\" as colorful graffiti on a concrete wall, spray paint drips",
                negative_prompt: "misspelled, extra letters, blurry, low quality",
            },
        ),
        (
            "chrome",
            TextEffect {
                description: "Reflective chrome",
                template: "the word \"{text}\" in reflective chrome letters, 80s retro, sunset reflections",
                negative_prompt: "misspelled, extra letters, blurry, low quality",
            },
        ),
        (
            "nature",
            TextEffect {
                description: "Leaves and flowers",
                template: "the word \"{text}\" formed from green leaves and flowers, soft daylight, typography",
                negative_prompt: "misspelled, extra letters, blurry, low quality",
            },
        ),
    ],
);

pub static ANALYSIS_PROMPTS: PresetTable<&'static str> = PresetTable::new(
    "analysis type",
    "detailed",
    &[
        (
            "detailed",
            "Analyze this image in detail. Provide:\n\
             1. Main subject and composition\n\
             2. Colors, lighting, and mood\n\
             3. Style and artistic elements\n\
             4. Technical quality\n\
             5. Suggested improvements for photo editing",
        ),
        ("simple", "Describe this image in 2-3 sentences."),
        (
            "artistic",
            "Analyze the artistic qualities of this image:\n\
             - Style and technique\n\
             - Composition and balance\n\
             - Color palette and harmony\n\
             - Emotional impact\n\
             - Artistic inspirations or influences",
        ),
        (
            "technical",
            "Provide a technical analysis of this image:\n\
             - Image quality and resolution\n\
             - Exposure and lighting\n\
             - Color accuracy and balance\n\
             - Sharpness and detail\n\
             - Any technical issues or artifacts",
        ),
    ],
);

pub static CAPTION_PROMPTS: PresetTable<&'static str> = PresetTable::new(
    "caption style",
    "descriptive",
    &[
        (
            "descriptive",
            "Generate a clear, descriptive caption for this image in one sentence.",
        ),
        (
            "creative",
            "Generate a creative, engaging caption for this image suitable for social media.",
        ),
        (
            "technical",
            "Generate a technical caption describing the image composition and elements.",
        ),
        (
            "social",
            "Generate a catchy social media caption with relevant hashtag suggestions.",
        ),
    ],
);

/// `{prompt}` is replaced with the user's prompt.
pub static ENHANCE_PROMPTS: PresetTable<&'static str> = PresetTable::new(
    "enhancement context",
    "image generation",
    &[
        (
            "image generation",
            "Enhance this image generation prompt to be more detailed and effective for AI image generation.\n\
             Original prompt: \"{prompt}\"\n\n\
             Provide an enhanced version that:\n\
             - Adds relevant artistic details\n\
             - Specifies quality and style\n\
             - Includes technical parameters\n\
             - Maintains the user's original intent\n\n\
             Enhanced prompt (provide ONLY the enhanced prompt, no explanations):",
        ),
        (
            "style transfer",
            "Enhance this style transfer prompt to be more specific and effective.\n\
             Original prompt: \"{prompt}\"\n\n\
             Provide an enhanced version that clearly describes the target style.\n\
             Enhanced prompt (provide ONLY the enhanced prompt, no explanations):",
        ),
        (
            "editing",
            "Enhance this image editing instruction to be clearer and more specific.\n\
             Original instruction: \"{prompt}\"\n\n\
             Provide an enhanced version that is clear and actionable.\n\
             Enhanced instruction (provide ONLY the enhanced instruction, no explanations):",
        ),
    ],
);

/// Side of the canvas an outpaint extends. A closed set: unknown values are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutpaintDirection {
    Left,
    Right,
    Top,
    Bottom,
    All,
}

impl FromStr for OutpaintDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "top" | "up" => Ok(Self::Top),
            "bottom" | "down" => Ok(Self::Bottom),
            "all" => Ok(Self::All),
            other => Err(Error::invalid(
                "direction",
                format!("`{other}` is not one of left, right, top, bottom, all"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_resolve_to_default() {
        let (key, style) = STYLES.resolve(Some("vaporwave"));
        assert_eq!(key, "none");
        assert_eq!(style.apply("a cat"), "a cat");

        let (key, ratio) = ASPECT_RATIOS.resolve(None);
        assert_eq!(key, "1:1");
        assert_eq!((ratio.width, ratio.height), (512, 512));

        assert_eq!(CONTROLNET_VARIANTS.resolve(Some("")).0, "canny");
    }

    #[test]
    fn known_keys_are_case_insensitive() {
        let (key, style) = STYLES.resolve(Some(" Anime "));
        assert_eq!(key, "anime");
        assert!(style.apply("a cat").starts_with("a cat, anime style"));
        assert_eq!(BASE_MODELS.get("SD-2.1").unwrap().id, "stabilityai/stable-diffusion-2-1");
    }

    #[test]
    fn aspect_ratios_sit_on_the_latent_grid() {
        for (_, ratio) in ASPECT_RATIOS.entries() {
            assert_eq!(ratio.width % 8, 0);
            assert_eq!(ratio.height % 8, 0);
        }
    }

    #[test]
    fn every_default_key_exists() {
        assert!(STYLES.get(STYLES.default_key()).is_some());
        assert!(TEXT_EFFECTS.get(TEXT_EFFECTS.default_key()).is_some());
        assert!(ANALYSIS_PROMPTS.get(ANALYSIS_PROMPTS.default_key()).is_some());
        assert!(ENHANCE_PROMPTS.get(ENHANCE_PROMPTS.default_key()).is_some());
        assert!(SDXL_MODELS.get(SDXL_MODELS.default_key()).is_some());
    }

    #[test]
    fn direction_is_a_closed_set() {
        assert_eq!("LEFT".parse::<OutpaintDirection>().unwrap(), OutpaintDirection::Left);
        let err = "diagonal".parse::<OutpaintDirection>().unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn text_effects_embed_the_text() {
        let (_, effect) = TEXT_EFFECTS.resolve(Some("fire"));
        assert!(effect.render("HELLO").contains("\"HELLO\""));
    }
}
