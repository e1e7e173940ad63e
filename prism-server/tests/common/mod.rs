//! Shared fixtures for the router integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, Rgb, RgbImage};
use prism_core::{
    Availability, Capability, CapabilityTable, DeviceConfig, DeviceMap, GenerationRequest,
    LoadSpec, Part, Pipeline, PipelineLoader, Registry, Result, SlotKey, VisionLanguage,
};
use prism_server::bootstrap::AppContext;
use prism_server::config::CorsConfig;
use prism_server::routes::create_router;
use prism_server::state::AppState;
use tempfile::TempDir;

const BOUNDARY: &str = "prism-test-boundary";

/// Builds `multipart/form-data` request bodies.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// A part with a content type but no file name.
    pub fn part(mut self, name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn png(self, name: &str, img: &DynamicImage) -> Self {
        self.file(name, &format!("{name}.png"), "image/png", &png_bytes(img))
    }

    pub fn request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

pub fn solid(width: u32, height: u32, px: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(px)))
}

pub fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_image(response: Response<Body>) -> DynamicImage {
    image::load_from_memory(&body_bytes(response).await).unwrap()
}

/// One recorded pipeline invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub slot: SlotKey,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub has_image: bool,
    pub has_mask: bool,
}

#[derive(Default)]
pub struct Recorder {
    pub loads: AtomicUsize,
    pub loaded: Mutex<Vec<(SlotKey, String)>>,
    pub calls: Mutex<Vec<Call>>,
}

impl Recorder {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

/// Loader whose pipelines paint a solid image of the requested size.
pub struct StubLoader(pub Arc<Recorder>);

struct StubPipeline {
    slot: SlotKey,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl PipelineLoader for StubLoader {
    async fn load(&self, spec: &LoadSpec) -> Result<Arc<dyn Pipeline>> {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.0.loads.fetch_add(1, Ordering::SeqCst);
        self.0
            .loaded
            .lock()
            .unwrap()
            .push((spec.slot, spec.source.identifier()));
        Ok(Arc::new(StubPipeline {
            slot: spec.slot,
            recorder: Arc::clone(&self.0),
        }))
    }
}

#[async_trait]
impl Pipeline for StubPipeline {
    async fn run(&self, request: GenerationRequest) -> Result<DynamicImage> {
        self.recorder.calls.lock().unwrap().push(Call {
            slot: self.slot,
            prompt: request.prompt.clone(),
            width: request.width,
            height: request.height,
            steps: request.steps,
            has_image: request.image.is_some(),
            has_mask: request.mask.is_some(),
        });
        Ok(solid(request.width, request.height, [40, 80, 120]))
    }
}

/// Vision client answering every prompt with a fixed text.
pub struct StubVision(pub &'static str);

#[async_trait]
impl VisionLanguage for StubVision {
    async fn generate(&self, _parts: Vec<Part>) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub recorder: Arc<Recorder>,
    pub dir: TempDir,
}

#[derive(Default)]
pub struct Options {
    pub diffusion: bool,
    pub advanced: bool,
    pub background: bool,
    pub vision: Option<&'static str>,
}

pub fn test_app(options: Options) -> TestApp {
    let recorder = Arc::new(Recorder::default());
    let loader: Arc<dyn PipelineLoader> = Arc::new(StubLoader(Arc::clone(&recorder)));
    let family = |enabled: bool| {
        if enabled {
            Availability::Ready(Arc::clone(&loader))
        } else {
            Availability::Disabled("not enabled in this test".to_string())
        }
    };
    let table = CapabilityTable::new()
        .with(Capability::Diffusion, family(options.diffusion))
        .with(Capability::Advanced, family(options.advanced))
        .with(Capability::BackgroundRemoval, family(options.background));

    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(
        table,
        DeviceConfig::new(DeviceMap::ForceCpu, dir.path().join("models")),
    );
    let mut ctx = AppContext::new(registry, dir.path());
    if let Some(answer) = options.vision {
        ctx = ctx.with_vision(Arc::new(StubVision(answer)));
    }
    let state: AppState = Arc::new(ctx);
    let app = create_router(Arc::clone(&state), &CorsConfig::AllowAll);

    TestApp {
        app,
        state,
        recorder,
        dir,
    }
}
