/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Quoting has three roles. Sales build and submit quotes, admins run the
 * first review and own the catalog and margin settings, finance signs off
 * on quotes whose margin falls under the threshold.
 */

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

pub mod consts {
    pub const QUOTES_CREATE: &str = "quotes:create";
    pub const QUOTES_READ_OWN: &str = "quotes:read-own";
    pub const QUOTES_READ_ALL: &str = "quotes:read-all";
    pub const QUOTES_REVIEW: &str = "quotes:review";
    pub const QUOTES_FINANCE: &str = "quotes:finance";
    pub const PRODUCTS_READ: &str = "products:read";
    pub const PRODUCTS_MANAGE: &str = "products:manage";
    pub const SETTINGS_READ: &str = "settings:read";
    pub const SETTINGS_MANAGE: &str = "settings:manage";
    pub const PROFILES_MANAGE: &str = "profiles:manage";
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    Sales,
    Admin,
    Finance,
}

lazy_static! {
    static ref ROLE_PERMISSIONS: HashMap<Role, Vec<&'static str>> = {
        use consts::*;
        let mut roles = HashMap::new();

        roles.insert(
            Role::Sales,
            vec![QUOTES_CREATE, QUOTES_READ_OWN, PRODUCTS_READ, SETTINGS_READ],
        );

        roles.insert(
            Role::Admin,
            vec![
                "quotes:*",
                "products:*",
                "settings:*",
                PROFILES_MANAGE,
            ],
        );

        roles.insert(
            Role::Finance,
            vec![
                QUOTES_READ_ALL,
                QUOTES_REVIEW,
                QUOTES_FINANCE,
                PRODUCTS_READ,
                SETTINGS_READ,
            ],
        );

        roles
    };
}

impl Role {
    pub fn permissions(self) -> &'static [&'static str] {
        ROLE_PERMISSIONS
            .get(&self)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_permission(self, required: &str) -> bool {
        self.permissions()
            .iter()
            .any(|granted| check_permission(granted, required))
    }
}

/// Check if a granted permission covers a required one (`quotes:*` covers
/// `quotes:review`).
pub fn check_permission(granted: &str, required: &str) -> bool {
    if granted == required || granted == "*" {
        return true;
    }

    if let Some(prefix) = granted.strip_suffix(":*") {
        return required
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with(':'))
            .unwrap_or(false);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::consts::*;
    use super::*;

    #[test]
    fn wildcard_matches_only_its_resource() {
        assert!(check_permission("quotes:*", QUOTES_FINANCE));
        assert!(!check_permission("quotes:*", PRODUCTS_MANAGE));
        assert!(!check_permission("quotes:*", "quotesx:read"));
        assert!(check_permission("*", SETTINGS_MANAGE));
    }

    #[test]
    fn role_permission_table() {
        assert!(Role::Admin.has_permission(QUOTES_REVIEW));
        assert!(Role::Admin.has_permission(SETTINGS_MANAGE));
        assert!(Role::Finance.has_permission(QUOTES_FINANCE));
        assert!(!Role::Finance.has_permission(PRODUCTS_MANAGE));
        assert!(Role::Sales.has_permission(QUOTES_CREATE));
        assert!(!Role::Sales.has_permission(QUOTES_READ_ALL));
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Finance".parse::<Role>().unwrap(), Role::Finance);
        assert_eq!(Role::Sales.to_string(), "sales");
    }
}
