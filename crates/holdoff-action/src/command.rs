//! Typed mutating operations of the management gateway.
//!
//! Every command has a stable string tag (the persisted `action_type`) and
//! a positional parameter list encoded with [`crate::codec`].

use std::collections::BTreeSet;
use std::fmt;

use crate::codec::{self, Param, Params};
use crate::error::{ActionError, CodecError};

/// A mutating administrative call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyCommand {
    SetCameraDisabled(bool),
    SetUserRestriction { restriction: String, enabled: bool },
    SetNetworkLoggingEnabled(bool),
    SetSecurityLoggingEnabled(bool),
    SetLocationEnabled(bool),
    SetKeyguardDisabled(bool),
    SetStatusBarDisabled(bool),
    SetUsbDataSignalingEnabled(bool),
    SetLogoutEnabled(bool),
    SetPersonalAppsSuspended(bool),
    SetPreferentialNetworkServiceEnabled(bool),
    LockNow,
    Reboot,
    SetPasswordQuality(i32),
    SetRequiredPasswordComplexity(i32),
    SetLockTaskFeatures(i32),
    SetKeyguardDisabledFeatures(i32),
    SetMaximumFailedPasswordsForWipe(i32),
    WipeData(i32),
    WipeDevice(i32),
    /// Removes the user with the given serial number.
    RemoveUser(i64),
    SetApplicationHidden { package: String, hidden: bool },
    SetUninstallBlocked { package: String, blocked: bool },
    EnableSystemApp(String),
    InstallExistingPackage(String),
    SetOrganizationName(Option<String>),
    SetDeviceOwnerLockScreenInfo(Option<String>),
    SetSecureSetting { setting: String, value: Option<String> },
    SetGlobalSetting { setting: String, value: Option<String> },
    SetLockTaskPackages(Vec<String>),
    SetPackagesSuspended { packages: Vec<String>, suspended: bool },
    /// `None` permits every input method.
    SetPermittedInputMethods(Option<Vec<String>>),
    SetDelegatedScopes { package: String, scopes: Vec<String> },
    SetMeteredDataDisabledPackages(Vec<String>),
    SetAffiliationIds(BTreeSet<String>),
    SetCrossProfilePackages(BTreeSet<String>),
    RemoveActiveAdmin,
    ClearDeviceOwnerApp,
    ClearProfileOwner,
}

impl PolicyCommand {
    /// Every tag a command can carry.
    pub const TAGS: [&'static str; 39] = [
        "setCameraDisabled",
        "setUserRestriction",
        "setNetworkLoggingEnabled",
        "setSecurityLoggingEnabled",
        "setLocationEnabled",
        "setKeyguardDisabled",
        "setStatusBarDisabled",
        "setUsbDataSignalingEnabled",
        "setLogoutEnabled",
        "setPersonalAppsSuspended",
        "setPreferentialNetworkServiceEnabled",
        "lockNow",
        "reboot",
        "setPasswordQuality",
        "setRequiredPasswordComplexity",
        "setLockTaskFeatures",
        "setKeyguardDisabledFeatures",
        "setMaximumFailedPasswordsForWipe",
        "wipeData",
        "wipeDevice",
        "removeUser",
        "setApplicationHidden",
        "setUninstallBlocked",
        "enableSystemApp",
        "installExistingPackage",
        "setOrganizationName",
        "setDeviceOwnerLockScreenInfo",
        "setSecureSetting",
        "setGlobalSetting",
        "setLockTaskPackages",
        "setPackagesSuspended",
        "setPermittedInputMethods",
        "setDelegatedScopes",
        "setMeteredDataDisabledPackages",
        "setAffiliationIds",
        "setCrossProfilePackages",
        "removeActiveAdmin",
        "clearDeviceOwnerApp",
        "clearProfileOwner",
    ];

    pub fn tag(&self) -> &'static str {
        use PolicyCommand::*;
        match self {
            SetCameraDisabled(_) => "setCameraDisabled",
            SetUserRestriction { .. } => "setUserRestriction",
            SetNetworkLoggingEnabled(_) => "setNetworkLoggingEnabled",
            SetSecurityLoggingEnabled(_) => "setSecurityLoggingEnabled",
            SetLocationEnabled(_) => "setLocationEnabled",
            SetKeyguardDisabled(_) => "setKeyguardDisabled",
            SetStatusBarDisabled(_) => "setStatusBarDisabled",
            SetUsbDataSignalingEnabled(_) => "setUsbDataSignalingEnabled",
            SetLogoutEnabled(_) => "setLogoutEnabled",
            SetPersonalAppsSuspended(_) => "setPersonalAppsSuspended",
            SetPreferentialNetworkServiceEnabled(_) => "setPreferentialNetworkServiceEnabled",
            LockNow => "lockNow",
            Reboot => "reboot",
            SetPasswordQuality(_) => "setPasswordQuality",
            SetRequiredPasswordComplexity(_) => "setRequiredPasswordComplexity",
            SetLockTaskFeatures(_) => "setLockTaskFeatures",
            SetKeyguardDisabledFeatures(_) => "setKeyguardDisabledFeatures",
            SetMaximumFailedPasswordsForWipe(_) => "setMaximumFailedPasswordsForWipe",
            WipeData(_) => "wipeData",
            WipeDevice(_) => "wipeDevice",
            RemoveUser(_) => "removeUser",
            SetApplicationHidden { .. } => "setApplicationHidden",
            SetUninstallBlocked { .. } => "setUninstallBlocked",
            EnableSystemApp(_) => "enableSystemApp",
            InstallExistingPackage(_) => "installExistingPackage",
            SetOrganizationName(_) => "setOrganizationName",
            SetDeviceOwnerLockScreenInfo(_) => "setDeviceOwnerLockScreenInfo",
            SetSecureSetting { .. } => "setSecureSetting",
            SetGlobalSetting { .. } => "setGlobalSetting",
            SetLockTaskPackages(_) => "setLockTaskPackages",
            SetPackagesSuspended { .. } => "setPackagesSuspended",
            SetPermittedInputMethods(_) => "setPermittedInputMethods",
            SetDelegatedScopes { .. } => "setDelegatedScopes",
            SetMeteredDataDisabledPackages(_) => "setMeteredDataDisabledPackages",
            SetAffiliationIds(_) => "setAffiliationIds",
            SetCrossProfilePackages(_) => "setCrossProfilePackages",
            RemoveActiveAdmin => "removeActiveAdmin",
            ClearDeviceOwnerApp => "clearDeviceOwnerApp",
            ClearProfileOwner => "clearProfileOwner",
        }
    }

    /// Positional arguments in persisted order.
    pub fn params(&self) -> Vec<Param> {
        use PolicyCommand::*;
        match self {
            SetCameraDisabled(b)
            | SetNetworkLoggingEnabled(b)
            | SetSecurityLoggingEnabled(b)
            | SetLocationEnabled(b)
            | SetKeyguardDisabled(b)
            | SetStatusBarDisabled(b)
            | SetUsbDataSignalingEnabled(b)
            | SetLogoutEnabled(b)
            | SetPersonalAppsSuspended(b)
            | SetPreferentialNetworkServiceEnabled(b) => vec![Param::Bool(*b)],
            SetUserRestriction {
                restriction,
                enabled,
            } => vec![restriction.as_str().into(), (*enabled).into()],
            LockNow | Reboot | RemoveActiveAdmin | ClearDeviceOwnerApp | ClearProfileOwner => {
                vec![]
            }
            SetPasswordQuality(i)
            | SetRequiredPasswordComplexity(i)
            | SetLockTaskFeatures(i)
            | SetKeyguardDisabledFeatures(i)
            | SetMaximumFailedPasswordsForWipe(i)
            | WipeData(i)
            | WipeDevice(i) => vec![Param::Int(*i)],
            RemoveUser(serial) => vec![Param::Long(*serial)],
            SetApplicationHidden { package, hidden } => {
                vec![package.as_str().into(), (*hidden).into()]
            }
            SetUninstallBlocked { package, blocked } => {
                vec![package.as_str().into(), (*blocked).into()]
            }
            EnableSystemApp(package) | InstallExistingPackage(package) => {
                vec![package.as_str().into()]
            }
            SetOrganizationName(text) | SetDeviceOwnerLockScreenInfo(text) => {
                vec![text.clone().into()]
            }
            SetSecureSetting { setting, value } | SetGlobalSetting { setting, value } => {
                vec![setting.as_str().into(), value.clone().into()]
            }
            SetLockTaskPackages(packages) | SetMeteredDataDisabledPackages(packages) => {
                vec![Param::List(packages.clone())]
            }
            SetPackagesSuspended {
                packages,
                suspended,
            } => vec![Param::List(packages.clone()), (*suspended).into()],
            SetPermittedInputMethods(packages) => vec![packages.clone().into()],
            SetDelegatedScopes { package, scopes } => {
                vec![package.as_str().into(), Param::List(scopes.clone())]
            }
            SetAffiliationIds(ids) | SetCrossProfilePackages(ids) => vec![Param::Set(ids.clone())],
        }
    }

    /// Encoded payload for persistence.
    pub fn encode(&self) -> Result<String, CodecError> {
        codec::encode(&self.params())
    }

    /// Rebuild a command from its tag and decoded parameters.
    pub fn decode(tag: &str, p: &Params) -> Result<Self, ActionError> {
        use PolicyCommand::*;
        let command = match tag {
            "setCameraDisabled" => SetCameraDisabled(p.get_bool(0)?),
            "setUserRestriction" => SetUserRestriction {
                restriction: p.get_string(0)?,
                enabled: p.get_bool(1)?,
            },
            "setNetworkLoggingEnabled" => SetNetworkLoggingEnabled(p.get_bool(0)?),
            "setSecurityLoggingEnabled" => SetSecurityLoggingEnabled(p.get_bool(0)?),
            "setLocationEnabled" => SetLocationEnabled(p.get_bool(0)?),
            "setKeyguardDisabled" => SetKeyguardDisabled(p.get_bool(0)?),
            "setStatusBarDisabled" => SetStatusBarDisabled(p.get_bool(0)?),
            "setUsbDataSignalingEnabled" => SetUsbDataSignalingEnabled(p.get_bool(0)?),
            "setLogoutEnabled" => SetLogoutEnabled(p.get_bool(0)?),
            "setPersonalAppsSuspended" => SetPersonalAppsSuspended(p.get_bool(0)?),
            "setPreferentialNetworkServiceEnabled" => {
                SetPreferentialNetworkServiceEnabled(p.get_bool(0)?)
            }
            "lockNow" => LockNow,
            "reboot" => Reboot,
            "setPasswordQuality" => SetPasswordQuality(p.get_int(0)?),
            "setRequiredPasswordComplexity" => SetRequiredPasswordComplexity(p.get_int(0)?),
            "setLockTaskFeatures" => SetLockTaskFeatures(p.get_int(0)?),
            "setKeyguardDisabledFeatures" => SetKeyguardDisabledFeatures(p.get_int(0)?),
            "setMaximumFailedPasswordsForWipe" => SetMaximumFailedPasswordsForWipe(p.get_int(0)?),
            "wipeData" => WipeData(p.get_int(0)?),
            "wipeDevice" => WipeDevice(p.get_int(0)?),
            "removeUser" => RemoveUser(p.get_long(0)?),
            "setApplicationHidden" => SetApplicationHidden {
                package: p.get_string(0)?,
                hidden: p.get_bool(1)?,
            },
            "setUninstallBlocked" => SetUninstallBlocked {
                package: p.get_string(0)?,
                blocked: p.get_bool(1)?,
            },
            "enableSystemApp" => EnableSystemApp(p.get_string(0)?),
            "installExistingPackage" => InstallExistingPackage(p.get_string(0)?),
            "setOrganizationName" => SetOrganizationName(p.get_optional_string(0)?),
            "setDeviceOwnerLockScreenInfo" => {
                SetDeviceOwnerLockScreenInfo(p.get_optional_string(0)?)
            }
            "setSecureSetting" => SetSecureSetting {
                setting: p.get_string(0)?,
                value: p.get_optional_string(1)?,
            },
            "setGlobalSetting" => SetGlobalSetting {
                setting: p.get_string(0)?,
                value: p.get_optional_string(1)?,
            },
            "setLockTaskPackages" => SetLockTaskPackages(p.get_string_list(0)?),
            "setPackagesSuspended" => SetPackagesSuspended {
                packages: p.get_string_list(0)?,
                suspended: p.get_bool(1)?,
            },
            "setPermittedInputMethods" => {
                SetPermittedInputMethods(p.get_optional_string_list(0)?)
            }
            "setDelegatedScopes" => SetDelegatedScopes {
                package: p.get_string(0)?,
                scopes: p.get_string_list(1)?,
            },
            "setMeteredDataDisabledPackages" => {
                SetMeteredDataDisabledPackages(p.get_string_list(0)?)
            }
            "setAffiliationIds" => SetAffiliationIds(p.get_string_set(0)?),
            "setCrossProfilePackages" => SetCrossProfilePackages(p.get_string_set(0)?),
            "removeActiveAdmin" => RemoveActiveAdmin,
            "clearDeviceOwnerApp" => ClearDeviceOwnerApp,
            "clearProfileOwner" => ClearProfileOwner,
            other => return Err(ActionError::UnknownAction(other.to_string())),
        };
        Ok(command)
    }

    /// Decode a persisted payload for `tag`.
    pub fn from_payload(tag: &str, payload: &str) -> Result<Self, ActionError> {
        let params = codec::decode(payload)?;
        Self::decode(tag, &params)
    }

    /// Human-readable summary shown in the pending list.
    pub fn describe(&self) -> String {
        use PolicyCommand::*;
        let toggle = |on: bool, yes: &str, no: &str| (if on { yes } else { no }).to_string();
        match self {
            SetCameraDisabled(d) => format!("{} camera", toggle(*d, "Disable", "Enable")),
            SetUserRestriction {
                restriction,
                enabled,
            } => format!(
                "{} restriction: {}",
                toggle(*enabled, "Enable", "Disable"),
                restriction
            ),
            SetNetworkLoggingEnabled(e) => {
                format!("{} network logging", toggle(*e, "Enable", "Disable"))
            }
            SetSecurityLoggingEnabled(e) => {
                format!("{} security logging", toggle(*e, "Enable", "Disable"))
            }
            SetLocationEnabled(e) => format!("{} location", toggle(*e, "Enable", "Disable")),
            SetKeyguardDisabled(d) => format!("{} keyguard", toggle(*d, "Disable", "Enable")),
            SetStatusBarDisabled(d) => format!("{} status bar", toggle(*d, "Disable", "Enable")),
            SetUsbDataSignalingEnabled(e) => {
                format!("{} USB data signaling", toggle(*e, "Enable", "Disable"))
            }
            SetLogoutEnabled(e) => format!("{} logout", toggle(*e, "Enable", "Disable")),
            SetPersonalAppsSuspended(s) => {
                format!("{} personal apps", toggle(*s, "Suspend", "Unsuspend"))
            }
            SetPreferentialNetworkServiceEnabled(e) => format!(
                "{} preferential network service",
                toggle(*e, "Enable", "Disable")
            ),
            LockNow => "Lock device".to_string(),
            Reboot => "Reboot device".to_string(),
            SetPasswordQuality(q) => format!("Set password quality: {}", q),
            SetRequiredPasswordComplexity(c) => {
                format!("Set required password complexity: {}", c)
            }
            SetLockTaskFeatures(f) => format!("Set lock task features: {}", f),
            SetKeyguardDisabledFeatures(f) => format!("Set keyguard disabled features: {}", f),
            SetMaximumFailedPasswordsForWipe(n) => {
                format!("Set max failed passwords for wipe: {}", n)
            }
            WipeData(_) => "Wipe data".to_string(),
            WipeDevice(_) => "Wipe device".to_string(),
            RemoveUser(serial) => format!("Remove user {}", serial),
            SetApplicationHidden { package, hidden } => {
                format!("{} app: {}", toggle(*hidden, "Hide", "Unhide"), package)
            }
            SetUninstallBlocked { package, blocked } => {
                format!("{} uninstall: {}", toggle(*blocked, "Block", "Allow"), package)
            }
            EnableSystemApp(package) => format!("Enable system app: {}", package),
            InstallExistingPackage(package) => format!("Install existing package: {}", package),
            SetOrganizationName(name) => format!(
                "Set organization name: {}",
                name.as_deref().unwrap_or("<none>")
            ),
            SetDeviceOwnerLockScreenInfo(_) => "Set lock screen info".to_string(),
            SetSecureSetting { setting, .. } => format!("Set secure setting: {}", setting),
            SetGlobalSetting { setting, .. } => format!("Set global setting: {}", setting),
            SetLockTaskPackages(_) => "Set lock task packages".to_string(),
            SetPackagesSuspended { suspended, .. } => {
                format!("{} packages", toggle(*suspended, "Suspend", "Unsuspend"))
            }
            SetPermittedInputMethods(_) => "Set permitted input methods".to_string(),
            SetDelegatedScopes { package, .. } => format!("Set delegated scopes for {}", package),
            SetMeteredDataDisabledPackages(_) => "Set metered data disabled packages".to_string(),
            SetAffiliationIds(_) => "Set affiliation IDs".to_string(),
            SetCrossProfilePackages(_) => "Set cross-profile packages".to_string(),
            RemoveActiveAdmin => "Remove active admin".to_string(),
            ClearDeviceOwnerApp => "Clear device owner".to_string(),
            ClearProfileOwner => "Clear profile owner".to_string(),
        }
    }
}

impl fmt::Display for PolicyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<PolicyCommand> {
        use PolicyCommand::*;
        let set: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        vec![
            SetCameraDisabled(true),
            SetUserRestriction {
                restriction: "no_usb_file_transfer".into(),
                enabled: true,
            },
            SetNetworkLoggingEnabled(false),
            SetSecurityLoggingEnabled(true),
            SetLocationEnabled(false),
            SetKeyguardDisabled(true),
            SetStatusBarDisabled(false),
            SetUsbDataSignalingEnabled(true),
            SetLogoutEnabled(true),
            SetPersonalAppsSuspended(false),
            SetPreferentialNetworkServiceEnabled(true),
            LockNow,
            Reboot,
            SetPasswordQuality(0x20000),
            SetRequiredPasswordComplexity(0x30000),
            SetLockTaskFeatures(3),
            SetKeyguardDisabledFeatures(16),
            SetMaximumFailedPasswordsForWipe(10),
            WipeData(0),
            WipeDevice(2),
            RemoveUser(10_000_000_000),
            SetApplicationHidden {
                package: "com.example.app".into(),
                hidden: true,
            },
            SetUninstallBlocked {
                package: "com.example.app".into(),
                blocked: false,
            },
            EnableSystemApp("com.android.chrome".into()),
            InstallExistingPackage("com.android.vending".into()),
            SetOrganizationName(Some("Acme".into())),
            SetDeviceOwnerLockScreenInfo(None),
            SetSecureSetting {
                setting: "location_mode".into(),
                value: Some("3".into()),
            },
            SetGlobalSetting {
                setting: "auto_time".into(),
                value: None,
            },
            SetLockTaskPackages(vec!["com.kiosk".into()]),
            SetPackagesSuspended {
                packages: vec!["x".into(), "y".into()],
                suspended: true,
            },
            SetPermittedInputMethods(None),
            SetDelegatedScopes {
                package: "com.delegate".into(),
                scopes: vec!["delegation-cert-install".into()],
            },
            SetMeteredDataDisabledPackages(vec![]),
            SetAffiliationIds(set.clone()),
            SetCrossProfilePackages(set),
            RemoveActiveAdmin,
            ClearDeviceOwnerApp,
            ClearProfileOwner,
        ]
    }

    #[test]
    fn test_tags_cover_every_command() {
        let samples = samples();
        assert_eq!(samples.len(), PolicyCommand::TAGS.len());
        for (command, tag) in samples.iter().zip(PolicyCommand::TAGS) {
            assert_eq!(command.tag(), tag);
        }
    }

    #[test]
    fn test_every_command_survives_persistence() {
        for command in samples() {
            let payload = command.encode().unwrap();
            let decoded = PolicyCommand::from_payload(command.tag(), &payload).unwrap();
            assert_eq!(decoded, command, "payload {}", payload);
        }
    }

    #[test]
    fn test_unknown_tag() {
        let err = PolicyCommand::from_payload("formatC", r#"{"params":[]}"#).unwrap_err();
        assert!(matches!(err, ActionError::UnknownAction(tag) if tag == "formatC"));
    }

    #[test]
    fn test_wrong_param_type_is_codec_error() {
        let err = PolicyCommand::from_payload("setCameraDisabled", r#"{"params":["yes"]}"#)
            .unwrap_err();
        assert!(matches!(err, ActionError::Codec(CodecError::TypeMismatch { .. })));

        let err = PolicyCommand::from_payload("wipeData", r#"{"params":[]}"#).unwrap_err();
        assert!(matches!(
            err,
            ActionError::Codec(CodecError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_describe() {
        assert_eq!(PolicyCommand::SetCameraDisabled(true).describe(), "Disable camera");
        assert_eq!(PolicyCommand::SetCameraDisabled(false).describe(), "Enable camera");
        assert_eq!(
            PolicyCommand::SetUserRestriction {
                restriction: "no_sms".into(),
                enabled: false,
            }
            .describe(),
            "Disable restriction: no_sms"
        );
        assert_eq!(
            PolicyCommand::SetUninstallBlocked {
                package: "p".into(),
                blocked: true,
            }
            .to_string(),
            "Block uninstall: p"
        );
        assert_eq!(PolicyCommand::LockNow.describe(), "Lock device");
    }
}
