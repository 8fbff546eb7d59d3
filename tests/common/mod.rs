#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;

use diaforge::cleanup::{Cleaner, CleanupMode};
use diaforge::event_bus::EventEmitter;
use diaforge::providers::{
    ChatRequest, ModelClient, ProviderError, TokenStream, TranscriptWriter,
};
use diaforge::stages::StageContext;

/// Model client that serves canned responses in order and records every
/// request, so tests can assert on prompt assembly.
pub struct ScriptedClient {
    responses: Mutex<Vec<Result<String, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<&str, &str>>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn stream(&self, request: ChatRequest) -> Result<TokenStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ProviderError::Stream {
                message: "scripted client ran out of responses".to_string(),
            });
        }
        match responses.remove(0) {
            Ok(text) => Ok(futures_util::stream::once(async move { Ok(text) }).boxed()),
            Err(message) => Err(ProviderError::Stream { message }),
        }
    }
}

/// A stage context over a scripted client, with fence-only cleanup so no
/// extra model calls sneak into the scripted sequence.
pub fn stage_context(client: Arc<ScriptedClient>) -> StageContext {
    StageContext {
        client,
        cleaner: Cleaner::new(CleanupMode::FenceOnly),
        transcripts: TranscriptWriter::disabled(),
        emitter: EventEmitter::disconnected(),
        temperature: 0.0,
    }
}

/// Write an executable shell script standing in for the `d2` binary.
/// Renderer argv is `--theme=<t> -l <layout> <in> <out>`, so `$4` is the
/// source and `$5` the output image.
pub fn fake_renderer(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(
        &path,
        format!(
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo v0.6.5; exit 0; fi\n{body}\n"
        ),
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }
    path
}

/// Fake renderer that always succeeds, copying a real PNG fixture to the
/// output path so the critique stage can load it.
pub fn ok_renderer(dir: &Path) -> PathBuf {
    let fixture = dir.join("fixture.png");
    image::RgbImage::new(64, 48).save(&fixture).unwrap();
    fake_renderer(
        dir,
        "d2-ok",
        &format!("cp \"{}\" \"$5\"\necho \"success: rendered\" >&2\nexit 0", fixture.display()),
    )
}

/// Fake renderer that always rejects the diagram.
pub fn failing_renderer(dir: &Path) -> PathBuf {
    fake_renderer(
        dir,
        "d2-fail",
        "echo \"err: failed to compile: 3:1: unexpected token\" >&2\nexit 1",
    )
}

/// Fake renderer that fails on the first invocation and succeeds after.
pub fn fail_once_renderer(dir: &Path) -> PathBuf {
    let fixture = dir.join("fixture.png");
    image::RgbImage::new(64, 48).save(&fixture).unwrap();
    let marker = dir.join("called");
    fake_renderer(
        dir,
        "d2-flaky",
        &format!(
            "if [ ! -f \"{marker}\" ]; then\n  touch \"{marker}\"\n  echo \"err: bad shape\" >&2\n  exit 1\nfi\ncp \"{fixture}\" \"$5\"\necho \"success: rendered\" >&2\nexit 0",
            marker = marker.display(),
            fixture = fixture.display()
        ),
    )
}
