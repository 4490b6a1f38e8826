//! In-process gateway backed by a serializable device model.
//!
//! Records every `apply` call, can be told to reject specific tags, and can
//! persist its device state as JSON so state survives between CLI runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use holdoff_core::error::HoldoffError;

use crate::command::PolicyCommand;
use crate::error::GatewayError;
use crate::gateway::{ManagementGateway, PolicyQuery, QueryValue};

/// Serial number of the primary user, which can never be removed.
pub const SYSTEM_USER_SERIAL: i64 = 0;

/// Simulated device-policy state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    pub device_owner: bool,
    pub profile_owner: bool,
    pub camera_disabled: bool,
    pub user_restrictions: BTreeSet<String>,
    pub network_logging_enabled: bool,
    pub security_logging_enabled: bool,
    pub location_enabled: bool,
    pub keyguard_disabled: bool,
    pub status_bar_disabled: bool,
    pub usb_data_signaling_enabled: bool,
    pub logout_enabled: bool,
    pub personal_apps_suspended: bool,
    pub preferential_network_service_enabled: bool,
    pub lock_count: u32,
    pub reboot_count: u32,
    pub wipe_count: u32,
    pub password_quality: i32,
    pub required_password_complexity: i32,
    pub lock_task_features: i32,
    pub keyguard_disabled_features: i32,
    pub maximum_failed_passwords_for_wipe: i32,
    pub users: Vec<i64>,
    pub hidden_packages: BTreeSet<String>,
    pub uninstall_blocked_packages: BTreeSet<String>,
    pub enabled_system_apps: BTreeSet<String>,
    pub installed_packages: BTreeSet<String>,
    pub organization_name: Option<String>,
    pub lock_screen_info: Option<String>,
    pub secure_settings: BTreeMap<String, String>,
    pub global_settings: BTreeMap<String, String>,
    pub lock_task_packages: Vec<String>,
    pub suspended_packages: BTreeSet<String>,
    pub permitted_input_methods: Option<Vec<String>>,
    pub delegated_scopes: BTreeMap<String, Vec<String>>,
    pub metered_data_disabled_packages: Vec<String>,
    pub affiliation_ids: BTreeSet<String>,
    pub cross_profile_packages: BTreeSet<String>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            device_owner: true,
            profile_owner: false,
            camera_disabled: false,
            user_restrictions: BTreeSet::new(),
            network_logging_enabled: false,
            security_logging_enabled: false,
            location_enabled: true,
            keyguard_disabled: false,
            status_bar_disabled: false,
            usb_data_signaling_enabled: true,
            logout_enabled: false,
            personal_apps_suspended: false,
            preferential_network_service_enabled: false,
            lock_count: 0,
            reboot_count: 0,
            wipe_count: 0,
            password_quality: 0,
            required_password_complexity: 0,
            lock_task_features: 0,
            keyguard_disabled_features: 0,
            maximum_failed_passwords_for_wipe: 0,
            users: vec![SYSTEM_USER_SERIAL],
            hidden_packages: BTreeSet::new(),
            uninstall_blocked_packages: BTreeSet::new(),
            enabled_system_apps: BTreeSet::new(),
            installed_packages: BTreeSet::new(),
            organization_name: None,
            lock_screen_info: None,
            secure_settings: BTreeMap::new(),
            global_settings: BTreeMap::new(),
            lock_task_packages: Vec::new(),
            suspended_packages: BTreeSet::new(),
            permitted_input_methods: None,
            delegated_scopes: BTreeMap::new(),
            metered_data_disabled_packages: Vec::new(),
            affiliation_ids: BTreeSet::new(),
            cross_profile_packages: BTreeSet::new(),
        }
    }
}

impl DeviceState {
    fn is_admin(&self) -> bool {
        self.device_owner || self.profile_owner
    }

    fn answer(&self, query: &PolicyQuery) -> QueryValue {
        use PolicyQuery::*;
        match query {
            IsDeviceOwner => QueryValue::Bool(self.device_owner),
            IsProfileOwner => QueryValue::Bool(self.profile_owner),
            CameraDisabled => QueryValue::Bool(self.camera_disabled),
            UserRestrictions => QueryValue::Set(self.user_restrictions.clone()),
            NetworkLoggingEnabled => QueryValue::Bool(self.network_logging_enabled),
            SecurityLoggingEnabled => QueryValue::Bool(self.security_logging_enabled),
            LocationEnabled => QueryValue::Bool(self.location_enabled),
            PasswordQuality => QueryValue::Int(self.password_quality),
            RequiredPasswordComplexity => QueryValue::Int(self.required_password_complexity),
            MaximumFailedPasswordsForWipe => {
                QueryValue::Int(self.maximum_failed_passwords_for_wipe)
            }
            LockTaskPackages => QueryValue::Strings(self.lock_task_packages.clone()),
            LockTaskFeatures => QueryValue::Int(self.lock_task_features),
            KeyguardDisabled => QueryValue::Bool(self.keyguard_disabled),
            KeyguardDisabledFeatures => QueryValue::Int(self.keyguard_disabled_features),
            OrganizationName => QueryValue::Text(self.organization_name.clone()),
            DeviceOwnerLockScreenInfo => QueryValue::Text(self.lock_screen_info.clone()),
            AffiliationIds => QueryValue::Set(self.affiliation_ids.clone()),
            CrossProfilePackages => QueryValue::Set(self.cross_profile_packages.clone()),
            ApplicationHidden(p) => QueryValue::Bool(self.hidden_packages.contains(p)),
            PackageSuspended(p) => QueryValue::Bool(self.suspended_packages.contains(p)),
            UninstallBlocked(p) => QueryValue::Bool(self.uninstall_blocked_packages.contains(p)),
            PermittedInputMethods => {
                QueryValue::OptionalStrings(self.permitted_input_methods.clone())
            }
            DelegatedScopes(p) => {
                QueryValue::Strings(self.delegated_scopes.get(p).cloned().unwrap_or_default())
            }
            Users => QueryValue::Serials(self.users.clone()),
        }
    }

    /// Apply a command, or explain why the simulated device refuses it.
    fn mutate(&mut self, command: &PolicyCommand) -> Result<(), String> {
        use PolicyCommand::*;
        if !self.is_admin() {
            return Err("not a device or profile owner".to_string());
        }
        match command {
            SetCameraDisabled(v) => self.camera_disabled = *v,
            SetUserRestriction {
                restriction,
                enabled,
            } => toggle(&mut self.user_restrictions, restriction, *enabled),
            SetNetworkLoggingEnabled(v) => self.network_logging_enabled = *v,
            SetSecurityLoggingEnabled(v) => self.security_logging_enabled = *v,
            SetLocationEnabled(v) => self.location_enabled = *v,
            SetKeyguardDisabled(v) => self.keyguard_disabled = *v,
            SetStatusBarDisabled(v) => self.status_bar_disabled = *v,
            SetUsbDataSignalingEnabled(v) => self.usb_data_signaling_enabled = *v,
            SetLogoutEnabled(v) => self.logout_enabled = *v,
            SetPersonalAppsSuspended(v) => {
                if !self.profile_owner {
                    return Err("requires a profile owner".to_string());
                }
                self.personal_apps_suspended = *v
            }
            SetPreferentialNetworkServiceEnabled(v) => {
                self.preferential_network_service_enabled = *v
            }
            LockNow => self.lock_count += 1,
            Reboot => {
                if !self.device_owner {
                    return Err("requires a device owner".to_string());
                }
                self.reboot_count += 1
            }
            SetPasswordQuality(v) => self.password_quality = *v,
            SetRequiredPasswordComplexity(v) => self.required_password_complexity = *v,
            SetLockTaskFeatures(v) => self.lock_task_features = *v,
            SetKeyguardDisabledFeatures(v) => self.keyguard_disabled_features = *v,
            SetMaximumFailedPasswordsForWipe(v) => {
                if *v < 0 {
                    return Err(format!("invalid attempt count {}", v));
                }
                self.maximum_failed_passwords_for_wipe = *v
            }
            WipeData(_) | WipeDevice(_) => {
                let wipe_count = self.wipe_count + 1;
                *self = DeviceState {
                    wipe_count,
                    ..DeviceState::default()
                };
            }
            RemoveUser(serial) => {
                if *serial == SYSTEM_USER_SERIAL {
                    return Err("cannot remove the system user".to_string());
                }
                let before = self.users.len();
                self.users.retain(|s| s != serial);
                if self.users.len() == before {
                    return Err(format!("no user with serial {}", serial));
                }
            }
            SetApplicationHidden { package, hidden } => {
                toggle(&mut self.hidden_packages, package, *hidden)
            }
            SetUninstallBlocked { package, blocked } => {
                toggle(&mut self.uninstall_blocked_packages, package, *blocked)
            }
            EnableSystemApp(package) => {
                self.enabled_system_apps.insert(package.clone());
            }
            InstallExistingPackage(package) => {
                self.installed_packages.insert(package.clone());
            }
            SetOrganizationName(name) => self.organization_name = name.clone(),
            SetDeviceOwnerLockScreenInfo(info) => self.lock_screen_info = info.clone(),
            SetSecureSetting { setting, value } => {
                put_setting(&mut self.secure_settings, setting, value)
            }
            SetGlobalSetting { setting, value } => {
                put_setting(&mut self.global_settings, setting, value)
            }
            SetLockTaskPackages(packages) => self.lock_task_packages = packages.clone(),
            SetPackagesSuspended {
                packages,
                suspended,
            } => {
                for package in packages {
                    toggle(&mut self.suspended_packages, package, *suspended);
                }
            }
            SetPermittedInputMethods(packages) => self.permitted_input_methods = packages.clone(),
            SetDelegatedScopes { package, scopes } => {
                if scopes.is_empty() {
                    self.delegated_scopes.remove(package);
                } else {
                    self.delegated_scopes.insert(package.clone(), scopes.clone());
                }
            }
            SetMeteredDataDisabledPackages(packages) => {
                self.metered_data_disabled_packages = packages.clone()
            }
            SetAffiliationIds(ids) => self.affiliation_ids = ids.clone(),
            SetCrossProfilePackages(packages) => self.cross_profile_packages = packages.clone(),
            RemoveActiveAdmin => {
                self.device_owner = false;
                self.profile_owner = false;
            }
            ClearDeviceOwnerApp => {
                if !self.device_owner {
                    return Err("not a device owner".to_string());
                }
                self.device_owner = false
            }
            ClearProfileOwner => {
                if !self.profile_owner {
                    return Err("not a profile owner".to_string());
                }
                self.profile_owner = false
            }
        }
        Ok(())
    }
}

/// `None` when the file does not exist yet.
fn read_state(path: &Path) -> Result<Option<DeviceState>, HoldoffError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn toggle(set: &mut BTreeSet<String>, item: &str, present: bool) {
    if present {
        set.insert(item.to_string());
    } else {
        set.remove(item);
    }
}

fn put_setting(map: &mut BTreeMap<String, String>, key: &str, value: &Option<String>) {
    match value {
        Some(v) => {
            map.insert(key.to_string(), v.clone());
        }
        None => {
            map.remove(key);
        }
    }
}

/// Gateway that mutates a [`DeviceState`] in memory.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    state: Mutex<DeviceState>,
    calls: Mutex<Vec<PolicyCommand>>,
    rejections: Mutex<HashMap<String, String>>,
    persist_path: Option<PathBuf>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: DeviceState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Open a gateway whose state lives in a JSON file.
    ///
    /// A missing file starts from the default device.
    pub fn open(path: &Path) -> Result<Self, HoldoffError> {
        let state = read_state(path)?.unwrap_or_default();
        info!("Simulated device loaded from {}", path.display());
        Ok(Self {
            state: Mutex::new(state),
            persist_path: Some(path.to_path_buf()),
            ..Self::default()
        })
    }

    /// Make every future call with `tag` fail with `reason`.
    pub fn reject(&self, tag: &str, reason: &str) {
        if let Ok(mut rejections) = self.rejections.lock() {
            rejections.insert(tag.to_string(), reason.to_string());
        }
    }

    pub fn allow(&self, tag: &str) {
        if let Ok(mut rejections) = self.rejections.lock() {
            rejections.remove(tag);
        }
    }

    /// Every command passed to `apply`, including rejected ones.
    pub fn calls(&self) -> Vec<PolicyCommand> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn state(&self) -> DeviceState {
        match self.lock_synced() {
            Ok(state) => state.clone(),
            Err(e) => {
                warn!(error = %e, "Falling back to cached device state");
                self.state.lock().map(|s| s.clone()).unwrap_or_default()
            }
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, DeviceState>, GatewayError> {
        self.state
            .lock()
            .map_err(|e| GatewayError::Unavailable(format!("device state poisoned: {}", e)))
    }

    /// Lock the in-memory state after pulling in whatever another process
    /// last wrote to the backing file.
    fn lock_synced(&self) -> Result<MutexGuard<'_, DeviceState>, GatewayError> {
        let mut state = self.lock_state()?;
        if let Some(path) = &self.persist_path {
            let stored = read_state(path).map_err(|e| {
                GatewayError::Unavailable(format!("failed to read {}: {}", path.display(), e))
            })?;
            if let Some(stored) = stored {
                *state = stored;
            }
        }
        Ok(state)
    }

    fn persist(&self, state: &DeviceState) -> Result<(), GatewayError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        }
        // Readers in other processes must never see a half-written file.
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, content)
            .and_then(|()| std::fs::rename(&staging, path))
            .map_err(|e| {
                GatewayError::Unavailable(format!("failed to write {}: {}", path.display(), e))
            })
    }
}

#[async_trait]
impl ManagementGateway for SimulatedGateway {
    async fn query(&self, query: PolicyQuery) -> Result<QueryValue, GatewayError> {
        Ok(self.lock_synced()?.answer(&query))
    }

    async fn apply(&self, command: PolicyCommand) -> Result<(), GatewayError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        let rejection = self
            .rejections
            .lock()
            .ok()
            .and_then(|r| r.get(command.tag()).cloned());
        if let Some(reason) = rejection {
            warn!(action_type = command.tag(), reason = %reason, "Simulated gateway rejected call");
            return Err(GatewayError::Rejected {
                action: command.tag().to_string(),
                reason,
            });
        }

        let mut state = self.lock_synced()?;
        let mut next = state.clone();
        next.mutate(&command).map_err(|reason| GatewayError::Rejected {
            action: command.tag().to_string(),
            reason,
        })?;
        self.persist(&next)?;
        *state = next;
        debug!(action_type = command.tag(), "Simulated gateway applied call");
        Ok(())
    }
}
