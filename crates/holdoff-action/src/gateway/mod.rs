//! Management gateway contract.
//!
//! A gateway answers read-only [`PolicyQuery`]s and applies mutating
//! [`PolicyCommand`]s. Typed convenience methods live on [`GatewayExt`],
//! implemented once for every gateway.

pub mod simulated;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::PolicyCommand;
use crate::error::GatewayError;

pub use simulated::{DeviceState, SimulatedGateway};

/// Read-only questions a gateway can answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyQuery {
    IsDeviceOwner,
    IsProfileOwner,
    CameraDisabled,
    UserRestrictions,
    NetworkLoggingEnabled,
    SecurityLoggingEnabled,
    LocationEnabled,
    PasswordQuality,
    RequiredPasswordComplexity,
    MaximumFailedPasswordsForWipe,
    LockTaskPackages,
    LockTaskFeatures,
    KeyguardDisabled,
    KeyguardDisabledFeatures,
    OrganizationName,
    DeviceOwnerLockScreenInfo,
    AffiliationIds,
    CrossProfilePackages,
    ApplicationHidden(String),
    PackageSuspended(String),
    UninstallBlocked(String),
    PermittedInputMethods,
    DelegatedScopes(String),
    Users,
}

/// Answer to a [`PolicyQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryValue {
    Bool(bool),
    Int(i32),
    Text(Option<String>),
    Strings(Vec<String>),
    OptionalStrings(Option<Vec<String>>),
    Set(BTreeSet<String>),
    Serials(Vec<i64>),
}

impl QueryValue {
    fn kind(&self) -> &'static str {
        match self {
            QueryValue::Bool(_) => "bool",
            QueryValue::Int(_) => "int",
            QueryValue::Text(_) => "text",
            QueryValue::Strings(_) => "strings",
            QueryValue::OptionalStrings(_) => "optional strings",
            QueryValue::Set(_) => "set",
            QueryValue::Serials(_) => "serials",
        }
    }
}

/// External administrative API whose mutating calls can be deferred.
#[async_trait]
pub trait ManagementGateway: Send + Sync {
    async fn query(&self, query: PolicyQuery) -> Result<QueryValue, GatewayError>;

    async fn apply(&self, command: PolicyCommand) -> Result<(), GatewayError>;
}

macro_rules! value_conversion {
    ($variant:ident, $ty:ty) => {
        impl TryFrom<QueryValue> for $ty {
            type Error = QueryValue;

            fn try_from(value: QueryValue) -> Result<Self, Self::Error> {
                match value {
                    QueryValue::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
        }
    };
}

value_conversion!(Bool, bool);
value_conversion!(Int, i32);
value_conversion!(Text, Option<String>);
value_conversion!(Strings, Vec<String>);
value_conversion!(OptionalStrings, Option<Vec<String>>);
value_conversion!(Set, BTreeSet<String>);
value_conversion!(Serials, Vec<i64>);

async fn ask<G, T>(gateway: &G, query: PolicyQuery) -> Result<T, GatewayError>
where
    G: ManagementGateway + ?Sized,
    T: TryFrom<QueryValue, Error = QueryValue>,
{
    let value = gateway.query(query.clone()).await?;
    T::try_from(value).map_err(|other| {
        GatewayError::InvalidResponse(format!("{:?} answered with {}", query, other.kind()))
    })
}

/// Typed helpers over [`ManagementGateway::query`] and
/// [`ManagementGateway::apply`].
#[async_trait]
pub trait GatewayExt: ManagementGateway {
    async fn is_device_owner(&self) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::IsDeviceOwner).await
    }

    async fn is_profile_owner(&self) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::IsProfileOwner).await
    }

    async fn camera_disabled(&self) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::CameraDisabled).await
    }

    async fn user_restrictions(&self) -> Result<BTreeSet<String>, GatewayError> {
        ask(self, PolicyQuery::UserRestrictions).await
    }

    async fn network_logging_enabled(&self) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::NetworkLoggingEnabled).await
    }

    async fn security_logging_enabled(&self) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::SecurityLoggingEnabled).await
    }

    async fn location_enabled(&self) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::LocationEnabled).await
    }

    async fn password_quality(&self) -> Result<i32, GatewayError> {
        ask(self, PolicyQuery::PasswordQuality).await
    }

    async fn required_password_complexity(&self) -> Result<i32, GatewayError> {
        ask(self, PolicyQuery::RequiredPasswordComplexity).await
    }

    async fn maximum_failed_passwords_for_wipe(&self) -> Result<i32, GatewayError> {
        ask(self, PolicyQuery::MaximumFailedPasswordsForWipe).await
    }

    async fn lock_task_packages(&self) -> Result<Vec<String>, GatewayError> {
        ask(self, PolicyQuery::LockTaskPackages).await
    }

    async fn lock_task_features(&self) -> Result<i32, GatewayError> {
        ask(self, PolicyQuery::LockTaskFeatures).await
    }

    async fn keyguard_disabled(&self) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::KeyguardDisabled).await
    }

    async fn keyguard_disabled_features(&self) -> Result<i32, GatewayError> {
        ask(self, PolicyQuery::KeyguardDisabledFeatures).await
    }

    async fn organization_name(&self) -> Result<Option<String>, GatewayError> {
        ask(self, PolicyQuery::OrganizationName).await
    }

    async fn device_owner_lock_screen_info(&self) -> Result<Option<String>, GatewayError> {
        ask(self, PolicyQuery::DeviceOwnerLockScreenInfo).await
    }

    async fn affiliation_ids(&self) -> Result<BTreeSet<String>, GatewayError> {
        ask(self, PolicyQuery::AffiliationIds).await
    }

    async fn cross_profile_packages(&self) -> Result<BTreeSet<String>, GatewayError> {
        ask(self, PolicyQuery::CrossProfilePackages).await
    }

    async fn is_application_hidden(&self, package: &str) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::ApplicationHidden(package.to_string())).await
    }

    async fn is_package_suspended(&self, package: &str) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::PackageSuspended(package.to_string())).await
    }

    async fn is_uninstall_blocked(&self, package: &str) -> Result<bool, GatewayError> {
        ask(self, PolicyQuery::UninstallBlocked(package.to_string())).await
    }

    async fn permitted_input_methods(&self) -> Result<Option<Vec<String>>, GatewayError> {
        ask(self, PolicyQuery::PermittedInputMethods).await
    }

    async fn delegated_scopes(&self, package: &str) -> Result<Vec<String>, GatewayError> {
        ask(self, PolicyQuery::DelegatedScopes(package.to_string())).await
    }

    async fn users(&self) -> Result<Vec<i64>, GatewayError> {
        ask(self, PolicyQuery::Users).await
    }

    async fn set_camera_disabled(&self, disabled: bool) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::SetCameraDisabled(disabled)).await
    }

    async fn set_user_restriction(
        &self,
        restriction: &str,
        enabled: bool,
    ) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::SetUserRestriction {
            restriction: restriction.to_string(),
            enabled,
        })
        .await
    }

    async fn set_location_enabled(&self, enabled: bool) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::SetLocationEnabled(enabled)).await
    }

    async fn set_keyguard_disabled(&self, disabled: bool) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::SetKeyguardDisabled(disabled)).await
    }

    async fn lock_now(&self) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::LockNow).await
    }

    async fn reboot(&self) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::Reboot).await
    }

    async fn set_password_quality(&self, quality: i32) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::SetPasswordQuality(quality)).await
    }

    async fn set_application_hidden(
        &self,
        package: &str,
        hidden: bool,
    ) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::SetApplicationHidden {
            package: package.to_string(),
            hidden,
        })
        .await
    }

    async fn set_organization_name(&self, name: Option<&str>) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::SetOrganizationName(name.map(str::to_string)))
            .await
    }

    async fn set_affiliation_ids(&self, ids: BTreeSet<String>) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::SetAffiliationIds(ids)).await
    }

    async fn remove_user(&self, serial: i64) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::RemoveUser(serial)).await
    }

    async fn wipe_data(&self, flags: i32) -> Result<(), GatewayError> {
        self.apply(PolicyCommand::WipeData(flags)).await
    }
}

impl<T: ManagementGateway + ?Sized> GatewayExt for T {}
