use crate::build::{BuildRequest, Builder};
use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Writes a small placeholder archive per unit instead of building
pub struct PrebuiltBuilder {
    dir: PathBuf,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    built: Mutex<Vec<String>>,
    shutdowns: AtomicUsize,
}

impl PrebuiltBuilder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            failing: HashSet::new(),
            panicking: HashSet::new(),
            built: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// Fail the build of the unit with logical name `name`
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Panic while building the unit with logical name `name`
    pub fn panicking(mut self, name: &str) -> Self {
        self.panicking.insert(name.to_string());
        self
    }

    /// Logical names built so far
    pub async fn built(&self) -> Vec<String> {
        self.built.lock().await.clone()
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Builder for PrebuiltBuilder {
    async fn prepare(&self) -> BuildResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn build(&self, request: &BuildRequest) -> BuildResult<PathBuf> {
        if self.panicking.contains(&request.name) {
            panic!("builder panicked on {}", request.name);
        }
        if self.failing.contains(&request.name) {
            return Err(BuildError::Command {
                unit: request.name.clone(),
                status: Some(1),
                output: "simulated build failure".to_string(),
            });
        }
        let path = self.dir.join(format!("{}.zip", request.name));
        let mut archive = b"PK\x03\x04".to_vec();
        archive.extend_from_slice(request.function_name.as_bytes());
        tokio::fs::write(&path, archive).await?;
        self.built.lock().await.push(request.name.clone());
        Ok(path)
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
