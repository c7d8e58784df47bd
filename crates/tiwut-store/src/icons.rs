//! Icon caching.
//!
//! Lookup order: memory, then the on-disk cache, then the network.
//! The memory tier is cost-bounded (encoded bytes) with LRU eviction.
//! The disk tier is keyed by the last path segment of the icon address and
//! is never evicted. Two addresses ending in the same filename share a slot.

use crate::error::StoreError;
use crate::transport::Transport;
use image::GenericImageView;
use indexmap::IndexMap;
use log::{debug, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// A decodable image, kept in its original encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Icon {
    pub bytes: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl Icon {
    /// Accept `bytes` only if they decode as an image.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, StoreError> {
        let (width, height) = image::load_from_memory(&bytes)?.dimensions();
        Ok(Self {
            bytes: bytes.into(),
            width,
            height,
        })
    }

    fn cost(&self) -> usize {
        self.bytes.len()
    }
}

/// In-memory LRU tier. Front of the map is the least recently used entry.
struct MemoryCache {
    entries: IndexMap<String, Icon>,
    cost: usize,
    budget: usize,
}

impl MemoryCache {
    fn new(budget: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            cost: 0,
            budget,
        }
    }

    fn get(&mut self, key: &str) -> Option<Icon> {
        let (key, icon) = self.entries.shift_remove_entry(key)?;
        self.entries.insert(key, icon.clone());
        Some(icon)
    }

    fn insert(&mut self, key: &str, icon: Icon) {
        if icon.cost() > self.budget {
            debug!("Icon {} exceeds the memory budget, not keeping it", key);
            return;
        }

        if let Some(old) = self.entries.shift_remove(key) {
            self.cost -= old.cost();
        }
        self.cost += icon.cost();
        self.entries.insert(key.to_string(), icon);

        while self.cost > self.budget {
            match self.entries.shift_remove_index(0) {
                Some((evicted, old)) => {
                    debug!("Evicting icon {}", evicted);
                    self.cost -= old.cost();
                }
                None => break,
            }
        }
    }
}

/// Memory + disk cache in front of icon downloads.
pub struct IconCache {
    memory: Mutex<MemoryCache>,
    disk_dir: PathBuf,
    transport: Arc<dyn Transport>,
}

impl IconCache {
    pub fn new(disk_dir: PathBuf, memory_budget: usize, transport: Arc<dyn Transport>) -> Self {
        Self {
            memory: Mutex::new(MemoryCache::new(memory_budget)),
            disk_dir,
            transport,
        }
    }

    /// Resolve an icon through all three tiers.
    /// A failed download yields `None`; nothing is remembered about the failure.
    pub fn resolve(&self, url: &str) -> Option<Icon> {
        self.lookup_local(url).or_else(|| self.fetch(url))
    }

    /// Memory and disk only. Never touches the network.
    pub fn lookup_local(&self, url: &str) -> Option<Icon> {
        if url.is_empty() {
            return None;
        }

        if let Some(icon) = self.memory.lock().unwrap().get(url) {
            debug!("Icon memory hit: {}", url);
            return Some(icon);
        }

        let path = self.disk_path(url)?;
        let bytes = fs::read(&path).ok()?;
        match Icon::decode(bytes) {
            Ok(icon) => {
                debug!("Icon disk hit: {:?}", path);
                self.memory.lock().unwrap().insert(url, icon.clone());
                Some(icon)
            }
            Err(e) => {
                debug!("Ignoring undecodable cache file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Download, decode and store in both tiers.
    /// Concurrent calls for the same address each issue their own request.
    pub fn fetch(&self, url: &str) -> Option<Icon> {
        if url.is_empty() {
            return None;
        }

        let icon = match self.download(url) {
            Ok(icon) => icon,
            Err(e) => {
                warn!("Failed to download icon from {}: {}", url, e);
                return None;
            }
        };

        self.memory.lock().unwrap().insert(url, icon.clone());

        if let Some(path) = self.disk_path(url) {
            let written = fs::create_dir_all(&self.disk_dir).and_then(|_| fs::write(&path, &icon.bytes));
            if let Err(e) = written {
                warn!("Failed to write icon cache file {:?}: {}", path, e);
            }
        }

        Some(icon)
    }

    fn download(&self, url: &str) -> Result<Icon, StoreError> {
        let bytes = self.transport.get(url)?.into_bytes()?;
        Icon::decode(bytes)
    }

    /// `<disk_dir>/<last path segment>`, or `None` if the address has no filename.
    pub fn disk_path(&self, url: &str) -> Option<PathBuf> {
        icon_file_name(url).map(|name| self.disk_dir.join(name))
    }
}

fn icon_file_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([shade, shade, shade, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}
