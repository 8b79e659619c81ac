use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{DowngradeMode, DriverConfig, daemon_url, derive_ssh_user, new_alias};
use crate::error::{DriverError, Result};
use crate::identity::{ProvisionContext, strategy_for};
use crate::pki;
use crate::session::SessionClient;
use crate::store::CertStore;
use crate::{DRIVER_NAME, SENTINEL_DRIVER_NAME};

/// Lifecycle of one driver record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    #[default]
    Unconfigured,
    Configured,
    Created,
    Removed,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverState::Unconfigured => "unconfigured",
            DriverState::Configured => "configured",
            DriverState::Created => "created",
            DriverState::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Machine state as reported to the host tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineState {
    None,
    Running,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::None => f.write_str("none"),
            MachineState::Running => f.write_str("running"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub ip_address: String,
    /// Dashless UUID naming the instance in alias-form hostnames.
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub ssh_user: Option<String>,
    pub url: String,
    pub created: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DriverRecord {
    #[serde(default)]
    pub config: Option<DriverConfig>,
    #[serde(default)]
    pub state: DriverState,
    #[serde(default)]
    pub instance: Option<Instance>,
    // Driver-name bookkeeping lives only as long as this value.
    #[serde(skip)]
    name_queries: u32,
    #[serde(skip)]
    downgraded: bool,
}

impl DriverRecord {
    fn created(&self) -> bool {
        self.state == DriverState::Created
            && self.instance.as_ref().is_some_and(|instance| instance.created)
    }
}

/// Play-with-Docker machine driver.
///
/// One value drives one machine. Lifecycle calls take `&mut self`, so a
/// record is never mutated by two operations at once.
#[derive(Debug, Default)]
pub struct Driver {
    record: DriverRecord,
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configured(config: DriverConfig) -> Self {
        Self {
            record: DriverRecord {
                config: Some(config),
                state: DriverState::Configured,
                ..Default::default()
            },
        }
    }

    pub fn from_record(record: DriverRecord) -> Self {
        Self { record }
    }

    /// Resume the record persisted under `config`'s store, or start a fresh one.
    ///
    /// A persisted record keeps its own configuration. A removed machine's
    /// record is discarded so the name can be created again.
    pub fn load(config: DriverConfig) -> Result<Self> {
        let store = CertStore::new(&config.store_path, &config.machine_name);
        match store.load_record::<DriverRecord>()? {
            Some(record) if record.state == DriverState::Removed => {
                debug!(machine = %config.machine_name, "discarding removed driver record");
                Ok(Self::configured(config))
            }
            Some(mut record) => {
                debug!(machine = %config.machine_name, state = %record.state, "loaded driver record");
                if record.config.is_none() {
                    record.config = Some(config);
                }
                Ok(Self::from_record(record))
            }
            None => Ok(Self::configured(config)),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.store()?.save_record(&self.record)
    }

    pub fn record(&self) -> &DriverRecord {
        &self.record
    }

    pub fn set_config(&mut self, config: DriverConfig) -> Result<()> {
        match self.record.state {
            DriverState::Unconfigured | DriverState::Configured => {
                self.record.config = Some(config);
                self.record.state = DriverState::Configured;
                Ok(())
            }
            state => Err(DriverError::Configuration(format!(
                "cannot reconfigure a driver in state {state}"
            ))),
        }
    }

    pub fn config(&self) -> Result<&DriverConfig> {
        self.record
            .config
            .as_ref()
            .ok_or_else(|| DriverError::Configuration("driver is not configured".into()))
    }

    pub fn store(&self) -> Result<CertStore> {
        let config = self.config()?;
        Ok(CertStore::new(&config.store_path, &config.machine_name))
    }

    pub fn state(&self) -> DriverState {
        self.record.state
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.record.instance.as_ref()
    }

    pub fn pre_create_check(&self) -> Result<()> {
        self.config()?.validate()
    }

    /// Allocate the remote instance and install its TLS identity.
    pub async fn create(&mut self) -> Result<()> {
        if self.record.state != DriverState::Configured {
            return Err(DriverError::Configuration(format!(
                "cannot create from state {}",
                self.record.state
            )));
        }
        self.pre_create_check()?;

        let config = self.config()?.clone();
        let store = self.store()?;
        let client = SessionClient::new(config.endpoint.clone());
        let strategy = strategy_for(config.identity);
        let org = certificate_org(&config.machine_name);
        let alias = new_alias();

        info!(
            session = %config.session_id,
            machine = %config.machine_name,
            identity = config.identity.as_str(),
            "creating instance"
        );

        store.ensure_dirs()?;
        if strategy.needs_local_authority() {
            store.ensure_authority(&org)?;
            store.copy_client_material()?;
        }
        if strategy.needs_ssh_key() {
            let path = store.ssh_key_path();
            tokio::task::spawn_blocking(move || pki::generate_private_key(&path))
                .await
                .map_err(|err| {
                    DriverError::Generation(format!("key generation task failed: {err}"))
                })??;
        }

        let allocated = strategy
            .provision(&ProvisionContext {
                client: &client,
                store: &store,
                session_id: &config.session_id,
                alias: &alias,
                org: &org,
                host_encoding: config.host_encoding,
            })
            .await?;

        let host = config.host_encoding.daemon_host(
            &config.endpoint,
            &config.session_id,
            &alias,
            Some(&allocated.ip),
        )?;
        let url = daemon_url(&host, config.endpoint.tls_port);
        info!(instance = %allocated.name, ip = %allocated.ip, %url, "instance created");

        let ssh_user = match allocated.ssh_user {
            Some(user) => Some(user),
            None if strategy.needs_ssh_key() => {
                Some(derive_ssh_user(&allocated.ip, &config.session_id))
            }
            None => None,
        };

        self.record.instance = Some(Instance {
            name: allocated.name,
            ip_address: allocated.ip,
            alias,
            ssh_user,
            url,
            created: true,
        });
        self.record.state = DriverState::Created;
        store.save_record(&self.record)
    }

    /// Delete the remote instance. A failed call leaves the record untouched.
    ///
    /// The removed record is persisted before the in-memory state changes; if
    /// that write fails the error says the remote instance is already gone.
    pub async fn remove(&mut self) -> Result<()> {
        if self.record.state != DriverState::Created {
            return Err(DriverError::Configuration(format!(
                "cannot remove from state {}",
                self.record.state
            )));
        }
        let config = self.config()?;
        let name = self
            .record
            .instance
            .as_ref()
            .map(|instance| instance.name.clone())
            .ok_or_else(|| DriverError::Configuration("no instance recorded".into()))?;

        let client = SessionClient::new(config.endpoint.clone());
        if let Err(err) = client.delete_instance(&config.session_id, &name).await {
            warn!(instance = %name, %err, "failed to delete instance");
            return Err(err);
        }
        info!(instance = %name, "instance removed");

        let mut removed = self.record.clone();
        if let Some(instance) = removed.instance.as_mut() {
            instance.created = false;
        }
        removed.state = DriverState::Removed;
        self.store()?.save_record(&removed).map_err(|err| {
            DriverError::Io(format!(
                "instance {name} was deleted remotely but the record was not saved: {err}"
            ))
        })?;
        self.record = removed;
        Ok(())
    }

    /// Driver type name reported to the host tool.
    ///
    /// In query-counter mode the second query after creation latches the
    /// sentinel name for every later query.
    pub fn driver_name(&mut self) -> &'static str {
        let mode = self
            .record
            .config
            .as_ref()
            .map(|config| config.downgrade)
            .unwrap_or_default();
        if mode == DowngradeMode::CapabilityFlag {
            return DRIVER_NAME;
        }

        let answer = if self.record.downgraded {
            SENTINEL_DRIVER_NAME
        } else {
            if self.record.created() && self.record.name_queries == 1 {
                debug!("suppressing remote provisioning from the next driver-name query on");
                self.record.downgraded = true;
            }
            DRIVER_NAME
        };
        self.record.name_queries += 1;
        answer
    }

    /// Whether the host tool should skip SSH provisioning for this machine.
    pub fn remote_provisioning_disabled(&self) -> bool {
        self.record.created()
    }

    pub fn get_machine_name(&self) -> Result<&str> {
        Ok(&self.config()?.machine_name)
    }

    pub fn get_ip(&self) -> Result<&str> {
        Ok(&self.created_instance()?.ip_address)
    }

    pub fn get_url(&self) -> Result<&str> {
        Ok(&self.created_instance()?.url)
    }

    /// Always running once created; the remote owns the real lifecycle.
    pub fn get_state(&self) -> MachineState {
        if self.record.created() {
            MachineState::Running
        } else {
            MachineState::None
        }
    }

    pub fn get_ssh_hostname(&self) -> Result<String> {
        Err(DriverError::Unsupported("get_ssh_hostname"))
    }

    pub fn get_ssh_port(&self) -> Result<u16> {
        Err(DriverError::Unsupported("get_ssh_port"))
    }

    pub fn get_ssh_username(&self) -> String {
        self.record
            .instance
            .as_ref()
            .and_then(|instance| instance.ssh_user.clone())
            .unwrap_or_else(|| "unsupported".to_string())
    }

    pub fn ssh_key_path(&self) -> Result<PathBuf> {
        Ok(self.store()?.ssh_key_path())
    }

    pub fn start(&mut self) -> Result<()> {
        Err(DriverError::Unsupported("start"))
    }

    pub fn stop(&mut self) -> Result<()> {
        Err(DriverError::Unsupported("stop"))
    }

    pub fn restart(&mut self) -> Result<()> {
        Err(DriverError::Unsupported("restart"))
    }

    pub fn kill(&mut self) -> Result<()> {
        Err(DriverError::Unsupported("kill"))
    }

    fn created_instance(&self) -> Result<&Instance> {
        self.record
            .instance
            .as_ref()
            .filter(|_| self.record.created())
            .ok_or_else(|| DriverError::Configuration("instance has not been created".into()))
    }
}

/// `<local user>.<machine>`
fn certificate_org(machine_name: &str) -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| {
            debug!("USER and USERNAME unset, using 'unknown' as certificate organization user");
            "unknown".to_string()
        });
    format!("{user}.{machine_name}")
}
