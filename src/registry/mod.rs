use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::aof::writer::write_synced;
use crate::error::{AntError, Result};
use crate::instance::{version, Instance};
use crate::types::InstanceParams;

const MEMBERS_DIR: &str = "members";
const CONF_FILE: &str = "conf.json";

/// Persisted description of one instance, stored as `conf.json` in its
/// member directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConf {
    pub name: String,
    pub data_dir: String,
    pub version: String,
    pub params: InstanceParams,
}

impl InstanceConf {
    fn read(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Replace the file atomically.
    fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        write_synced(&tmp, &json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// All instances of one process, keyed by name.
///
/// Constructed once at startup and shared behind an `Arc`.
pub struct InstanceRegistry {
    members_dir: PathBuf,
    instances: DashMap<String, Arc<Instance>>,
}

impl InstanceRegistry {
    /// Open the registry rooted at `root`, creating `root/members` if needed.
    /// Existing members are not loaded until [`scan_and_register`].
    ///
    /// [`scan_and_register`]: InstanceRegistry::scan_and_register
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(AntError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }
        let members_dir = root.join(MEMBERS_DIR);
        fs::create_dir_all(&members_dir)?;
        Ok(Self {
            members_dir,
            instances: DashMap::new(),
        })
    }

    pub fn members_dir(&self) -> &Path {
        &self.members_dir
    }

    /// Create and register a new, unbuilt instance.
    #[instrument(skip(self, params), fields(instance = name))]
    pub fn create_instance(&self, name: &str, params: InstanceParams) -> Result<Arc<Instance>> {
        if !is_valid_instance_name(name) {
            return Err(AntError::Validation(format!(
                "invalid instance name '{name}': must be 1-255 chars, start with alphanumeric, \
                 and contain only alphanumeric, dash, underscore, or dot characters"
            )));
        }
        if params.dim == 0 {
            return Err(AntError::Validation("dim must be > 0".into()));
        }
        if params.nlist == 0 {
            return Err(AntError::Validation("nlist must be > 0".into()));
        }

        let slot = match self.instances.entry(name.to_string()) {
            Entry::Occupied(_) => {
                return Err(AntError::InstanceExists {
                    name: name.to_string(),
                })
            }
            Entry::Vacant(slot) => slot,
        };

        let dir = self.members_dir.join(name);
        if dir.exists() {
            return Err(AntError::InstanceExists {
                name: name.to_string(),
            });
        }
        fs::create_dir_all(&dir)?;

        let version = version::next_version(None);
        let created = Instance::open(&dir, &version, params.clone()).and_then(|instance| {
            let conf = InstanceConf {
                name: name.to_string(),
                data_dir: dir.display().to_string(),
                version: version.clone(),
                params: params.clone(),
            };
            conf.write(&dir.join(CONF_FILE))?;
            Ok(instance)
        });
        let instance = match created {
            Ok(instance) => Arc::new(instance),
            Err(e) => {
                let _ = fs::remove_dir_all(&dir);
                return Err(e);
            }
        };

        slot.insert(instance.clone());
        info!(instance = name, dim = params.dim, nlist = params.nlist, %version, "created instance");
        Ok(instance)
    }

    pub fn get_instance(&self, name: &str) -> Result<Arc<Instance>> {
        self.instances
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AntError::InstanceNotFound {
                name: name.to_string(),
            })
    }

    /// Registered instance names, sorted.
    pub fn list_instances(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Current persisted description of an instance.
    pub fn instance_config(&self, name: &str) -> Result<InstanceConf> {
        let instance = self.get_instance(name)?;
        Ok(InstanceConf {
            name: name.to_string(),
            data_dir: instance.data_dir().display().to_string(),
            version: instance.version(),
            params: instance.params().clone(),
        })
    }

    /// Unregister an instance and delete all of its data.
    ///
    /// Handles still held elsewhere (a running backup, an in-flight
    /// request) see `InstanceNotFound` on their next write.
    #[instrument(skip(self), fields(instance = name))]
    pub fn delete_instance(&self, name: &str) -> Result<()> {
        let (_, instance) =
            self.instances
                .remove(name)
                .ok_or_else(|| AntError::InstanceNotFound {
                    name: name.to_string(),
                })?;
        instance.destroy()?;
        let _ = crate::metrics::SEARCH_DURATION.remove_label_values(&[name]);
        info!(instance = name, "deleted instance");
        Ok(())
    }

    /// Load every member directory with a valid `conf.json` and recover
    /// its state. Members that cannot be loaded are skipped with a warning.
    #[instrument(skip(self))]
    pub fn scan_and_register(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.members_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.instances.contains_key(&name) {
                continue;
            }

            match self.load_member(&name, &entry.path()) {
                Ok(instance) => {
                    info!(instance = %name, count = instance.count(), version = %instance.version(), "registered instance");
                    self.instances.insert(name, instance);
                    count += 1;
                }
                Err(e) => warn!(instance = %name, error = %e, "skipping member"),
            }
        }

        info!(instances = count, "scanned and registered instances");
        Ok(count)
    }

    fn load_member(&self, name: &str, dir: &Path) -> Result<Arc<Instance>> {
        let conf_path = dir.join(CONF_FILE);
        if !conf_path.exists() {
            return Err(AntError::Config(format!("{CONF_FILE} missing")));
        }
        let conf = InstanceConf::read(&conf_path)?;
        if conf.name != name {
            warn!(instance = name, conf_name = %conf.name, "conf name differs from directory name");
        }
        let instance = Instance::open(dir, &conf.version, conf.params)?;
        instance.rebuild()?;
        Ok(Arc::new(instance))
    }

    /// Run the backup protocol for one instance, persisting the new
    /// version in its `conf.json` once the snapshot is durable.
    #[instrument(skip(self), fields(instance = name))]
    pub fn backup_instance(&self, name: &str) -> Result<String> {
        let instance = self.get_instance(name)?;
        let conf_path = instance.data_dir().join(CONF_FILE);
        let conf = InstanceConf {
            name: name.to_string(),
            data_dir: instance.data_dir().display().to_string(),
            version: instance.version(),
            params: instance.params().clone(),
        };
        instance.backup(|new_version| {
            InstanceConf {
                version: new_version.to_string(),
                ..conf
            }
            .write(&conf_path)
        })
    }

    /// Delete the oldest versions of an instance beyond `max_keep`.
    pub fn prune_versions(&self, name: &str, max_keep: usize) -> Result<Vec<String>> {
        let instance = self.get_instance(name)?;
        version::prune_versions(instance.data_dir(), &instance.version(), max_keep)
    }
}

/// Validate an instance name: 1-255 chars, starts with alphanumeric,
/// only contains `[a-zA-Z0-9._-]`.
fn is_valid_instance_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    let bytes = name.as_bytes();
    if !bytes[0].is_ascii_alphanumeric() {
        return false;
    }
    bytes
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}
