//! In-memory catalog used by the integration tests.
//!
//! Serves a small fixed catalog (two real Civitai models plus a few
//! synthetic ones) and deterministic file bytes, and can simulate an
//! unreachable or misconfigured network.

#![allow(dead_code)]

use async_trait::async_trait;
use civitai_cache::catalog::{
    CreatorRecord, FileHashes, FileRecord, ModelRecord, VersionRecord,
};
use civitai_cache::naming::strip_name;
use civitai_cache::{CacheConfig, CacheError, CatalogSource, ModelCache, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const AMIYA_ID: i64 = 115427;
pub const AMIYA_NAME: &str = "amiya arknights (old)";
pub const AMIYA_V1_0: i64 = 124870;
pub const AMIYA_V1_1: i64 = 124885;
pub const AMIYA_V1_0_SIZE: u64 = 25451;
pub const AMIYA_V1_1_SIZE: u64 = 25515;

pub const CETUS_ID: i64 = 6755;
pub const CETUS_V4: i64 = 78676;
pub const MOIST_VAE_SHA256: &str =
    "DF3C506E51B7EE1D7B5A6A2BB7142D47D488743C96AA778AFB0F53A2CDC2D38D";
pub const MOIST_VAE_SIZE: u64 = 404662241;

/// Model whose only version declares no primary file.
pub const KALTSIT_ID: i64 = 9001;

/// How the fixture network should fail, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    None,
    Unreachable,
    Tls,
}

pub struct FixtureCatalog {
    models: Vec<ModelRecord>,
    blobs: HashMap<String, Vec<u8>>,
    failure: std::sync::Mutex<Failure>,
    tamper: AtomicBool,
    downloads: AtomicUsize,
}

/// Deterministic bytes of the given length.
pub fn blob(seed: &str, len: u64) -> Vec<u8> {
    seed.bytes().cycle().take(len as usize).collect()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(bytes))
}

fn file_record(
    name: &str,
    url: &str,
    size: u64,
    sha256: &str,
    primary: Option<bool>,
) -> FileRecord {
    let mut hashes = FileHashes::default();
    hashes.0.insert("SHA256".to_string(), sha256.to_string());
    hashes
        .0
        .insert("AutoV2".to_string(), sha256[..10].to_string());
    FileRecord {
        name: name.to_string(),
        download_url: url.to_string(),
        size_kb: size as f64 / 1024.0,
        hashes,
        primary,
    }
}

fn version(id: i64, name: &str, files: Vec<FileRecord>) -> VersionRecord {
    VersionRecord {
        id,
        name: name.to_string(),
        model_id: None,
        files,
    }
}

fn model(id: i64, name: &str, creator: &str, versions: Vec<VersionRecord>) -> ModelRecord {
    ModelRecord {
        id,
        name: name.to_string(),
        creator: Some(CreatorRecord {
            username: Some(creator.to_string()),
        }),
        model_versions: versions,
    }
}

impl FixtureCatalog {
    pub fn new() -> Self {
        let mut blobs = HashMap::new();
        let mut served = |url: &str, bytes: Vec<u8>| -> String {
            let sha = sha256_hex(&bytes);
            blobs.insert(url.to_string(), bytes);
            sha
        };

        let amiya_v1_0_url = "https://civitai.test/api/download/models/124870";
        let amiya_v1_1_url = "https://civitai.test/api/download/models/124885";
        let amiya_v1_0_sha = served(amiya_v1_0_url, blob("amiya-v1.0", AMIYA_V1_0_SIZE));
        let amiya_v1_1_sha = served(amiya_v1_1_url, blob("amiya-v1.1", AMIYA_V1_1_SIZE));

        let kaltsit_url = "https://civitai.test/api/download/models/9001";
        let kaltsit_sha = served(kaltsit_url, blob("kaltsit", 2048));
        let kaltsit_preview_url = "https://civitai.test/api/download/models/9001?type=Preview";
        let kaltsit_preview_sha = served(kaltsit_preview_url, blob("preview", 1024));

        let numeric_url = "https://civitai.test/api/download/models/9100";
        let numeric_sha = served(numeric_url, blob("2077", 4096));

        let models = vec![
            model(
                AMIYA_ID,
                AMIYA_NAME,
                "narugo1992",
                vec![
                    version(
                        AMIYA_V1_1,
                        "v1.1",
                        vec![file_record(
                            "amiya.pt",
                            amiya_v1_1_url,
                            AMIYA_V1_1_SIZE,
                            &amiya_v1_1_sha,
                            Some(true),
                        )],
                    ),
                    version(
                        AMIYA_V1_0,
                        "v1.0",
                        vec![file_record(
                            "amiya.pt",
                            amiya_v1_0_url,
                            AMIYA_V1_0_SIZE,
                            &amiya_v1_0_sha,
                            Some(true),
                        )],
                    ),
                ],
            ),
            model(
                CETUS_ID,
                "Cetus-Mix",
                "Eagelaxis",
                vec![
                    version(
                        CETUS_V4,
                        "V4",
                        vec![
                            file_record(
                                "cetusMix_v4.safetensors",
                                "https://civitai.test/api/download/models/78676",
                                3894258133,
                                "B42B09FF12CA9CD70D78AA8210F8D4577EC513FC1484A68615385B8076292639",
                                Some(true),
                            ),
                            file_record(
                                "MoistMix.vae.pt",
                                "https://civitai.test/api/download/models/78676?type=VAE",
                                MOIST_VAE_SIZE,
                                MOIST_VAE_SHA256,
                                None,
                            ),
                        ],
                    ),
                    version(
                        45214,
                        "V3.5",
                        vec![file_record(
                            "cetusMix_v35.safetensors",
                            "https://civitai.test/api/download/models/45214",
                            4265380512,
                            "1A2B3C4D5E6F708192A3B4C5D6E7F8091A2B3C4D5E6F708192A3B4C5D6E7F809",
                            Some(true),
                        )],
                    ),
                ],
            ),
            // A version without a primary file, with two downloadable files.
            model(
                KALTSIT_ID,
                "Kal'tsit",
                "narugo1992",
                vec![version(
                    9001,
                    "v1",
                    vec![
                        file_record("kaltsit.safetensors", kaltsit_url, 2048, &kaltsit_sha, None),
                        file_record(
                            "kaltsit_preview.png",
                            kaltsit_preview_url,
                            1024,
                            &kaltsit_preview_sha,
                            Some(false),
                        ),
                    ],
                )],
            ),
            // A model whose name is a number that is not its id.
            model(
                9100,
                "2077",
                "nightcity",
                vec![version(
                    9100,
                    "final",
                    vec![file_record(
                        "2077.safetensors",
                        numeric_url,
                        4096,
                        &numeric_sha,
                        Some(true),
                    )],
                )],
            ),
            // Two distinct models sharing a normalized name.
            model(
                9200,
                "Twin Model",
                "alice",
                vec![version(9200, "v1", Vec::new())],
            ),
            model(
                9201,
                "twin-model",
                "bob",
                vec![version(9201, "v1", Vec::new())],
            ),
        ];

        Self {
            models,
            blobs,
            failure: std::sync::Mutex::new(Failure::None),
            tamper: AtomicBool::new(false),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn set_failure(&self, failure: Failure) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Serve corrupted bytes of the right length.
    pub fn set_tamper(&self, tamper: bool) {
        self.tamper.store(tamper, Ordering::SeqCst);
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn model(&self, id: i64) -> &ModelRecord {
        self.models.iter().find(|m| m.id == id).unwrap()
    }

    fn check_network(&self) -> Result<()> {
        match *self.failure.lock().unwrap() {
            Failure::None => Ok(()),
            Failure::Unreachable => Err(CacheError::Connection {
                message: "connection refused".to_string(),
            }),
            Failure::Tls => Err(CacheError::Tls {
                message: "invalid peer certificate".to_string(),
            }),
        }
    }
}

#[async_trait]
impl CatalogSource for FixtureCatalog {
    async fn model_by_id(&self, id: i64) -> Result<Option<ModelRecord>> {
        self.check_network()?;
        Ok(self.models.iter().find(|m| m.id == id).cloned())
    }

    async fn search_models(&self, query: &str) -> Result<Vec<ModelRecord>> {
        self.check_network()?;
        let key = strip_name(query);
        Ok(self
            .models
            .iter()
            .filter(|m| strip_name(&m.name).contains(&key))
            .cloned()
            .collect())
    }

    async fn version_by_hash(&self, hash: &str) -> Result<Option<VersionRecord>> {
        self.check_network()?;
        for model in &self.models {
            for version in &model.model_versions {
                if version.files.iter().any(|f| f.hashes.matches_prefix(hash)) {
                    let mut found = version.clone();
                    found.model_id = Some(model.id);
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.check_network()?;
        let mut bytes = self
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| CacheError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })?;
        if self.tamper.load(Ordering::SeqCst) {
            if let Some(first) = bytes.first_mut() {
                *first ^= 0xff;
            }
        }

        tokio::fs::write(dest, &bytes).await?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(bytes.len() as u64)
    }
}

/// A cache rooted in a fresh temp dir, backed by the fixture catalog.
pub struct TestCache {
    pub temp_dir: TempDir,
    pub catalog: Arc<FixtureCatalog>,
    pub cache: ModelCache,
}

pub fn create_test_cache() -> TestCache {
    create_test_cache_with(|config| config)
}

pub fn create_test_cache_with(configure: impl FnOnce(CacheConfig) -> CacheConfig) -> TestCache {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let catalog = Arc::new(FixtureCatalog::new());
    let config = configure(CacheConfig::new(temp_dir.path().join("civitai")));
    let cache = ModelCache::with_source(config, catalog.clone()).unwrap();
    TestCache {
        temp_dir,
        catalog,
        cache,
    }
}
