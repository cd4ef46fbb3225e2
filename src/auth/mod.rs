//! Acting identity and the authorization gate.
//!
//! Every handler and service call receives an explicit [`ActingIdentity`]
//! value; there is no ambient "current user". The gate rules are pure
//! functions over pre-fetched facts so they can be tested without a
//! database; [`directory`] is the lookup layer that produces those facts.

use axum::http::HeaderMap;
use base64::Engine;

use crate::error::{AppError, Result};
use crate::models::group::Group;

pub mod directory;

/// The authenticated identity a request acts as.
#[derive(Debug, Clone)]
pub struct ActingIdentity {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub is_superuser: bool,
    /// Group memberships, in directory order. The upload path requires
    /// exactly one.
    pub groups: Vec<Group>,
}

impl ActingIdentity {
    /// The actor's primary group (first membership), used by the download
    /// permission check.
    pub fn primary_group(&self) -> Option<&Group> {
        self.groups.first()
    }
}

/// Parse Basic credentials from request headers.
pub fn extract_basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic ").or(v.strip_prefix("basic ")))
        .and_then(|b64| base64::engine::general_purpose::STANDARD.decode(b64).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| {
            let mut parts = s.splitn(2, ':');
            let user = parts.next()?.to_string();
            let pass = parts.next()?.to_string();
            Some((user, pass))
        })
}

/// Facts about the package a registration/upload targets, fetched by the
/// caller before consulting the gate.
#[derive(Debug, Clone)]
pub enum PackageTarget<'a> {
    /// The package does not exist yet. `group_can_add_package` says whether
    /// the actor's sole group holds the `add_package` capability.
    New { group_can_add_package: bool },
    /// The package exists and is owned by these groups.
    Existing { owner_groups: &'a [Group] },
}

/// Group-based authorization rules for package registration and upload.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationGate {
    /// When set, any authenticated actor may register or modify any
    /// package (fully-open internal index).
    pub global_ownership: bool,
}

impl AuthorizationGate {
    pub fn new(global_ownership: bool) -> Self {
        Self { global_ownership }
    }

    /// The single-primary-group rule: the upload path requires the acting
    /// identity to belong to exactly one group. Zero or several memberships
    /// are rejected. Kept deliberately as a named rule; see DESIGN.md.
    pub fn sole_group<'a>(&self, actor: &'a ActingIdentity) -> Result<&'a Group> {
        match actor.groups.as_slice() {
            [group] => Ok(group),
            [] => Err(AppError::Forbidden(format!(
                "{} is not in a group, not allowing package to be uploaded.",
                actor.username
            ))),
            _ => Err(AppError::Forbidden(format!(
                "{} is in more than 1 group, not allowing package to be uploaded.",
                actor.username
            ))),
        }
    }

    /// May `actor` register (create or modify) the targeted package?
    ///
    /// Rules, evaluated in order:
    /// 1. global ownership flag set: any authenticated actor passes;
    /// 2. new package: the actor's sole group must hold `add_package`;
    /// 3. existing package: superuser, or the sole group is an owner group.
    pub fn can_register(&self, actor: &ActingIdentity, target: &PackageTarget<'_>) -> Result<()> {
        if self.global_ownership {
            return Ok(());
        }

        let group = self.sole_group(actor)?;

        match target {
            PackageTarget::New {
                group_can_add_package,
            } => {
                if *group_can_add_package {
                    Ok(())
                } else {
                    Err(AppError::Forbidden(format!(
                        "{}'s group - {} does not have permissions to upload new packages.",
                        actor.username, group.name
                    )))
                }
            }
            PackageTarget::Existing { owner_groups } => {
                if actor.is_superuser || owner_groups.iter().any(|g| g.id == group.id) {
                    Ok(())
                } else {
                    let owners = owner_groups
                        .iter()
                        .map(|g| g.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    Err(AppError::Forbidden(format!(
                        "'{}' is in the group '{}', only members of '{}' can upload new versions of this package.",
                        actor.username, group.name, owners
                    )))
                }
            }
        }
    }

    /// May `actor` upload a distribution to the targeted package? Same
    /// rules as registration: owning a package implies the right to attach
    /// files to its releases.
    pub fn can_upload(&self, actor: &ActingIdentity, target: &PackageTarget<'_>) -> Result<()> {
        self.can_register(actor, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn group(name: &str) -> Group {
        Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    fn actor(groups: Vec<Group>) -> ActingIdentity {
        ActingIdentity {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            is_superuser: false,
            groups,
        }
    }

    #[test]
    fn test_sole_group_requires_exactly_one_membership() {
        let gate = AuthorizationGate::new(false);

        let none = actor(vec![]);
        assert!(matches!(
            gate.sole_group(&none),
            Err(AppError::Forbidden(_))
        ));

        let two = actor(vec![group("a"), group("b")]);
        assert!(matches!(gate.sole_group(&two), Err(AppError::Forbidden(_))));

        let one = actor(vec![group("a")]);
        assert_eq!(gate.sole_group(&one).unwrap().name, "a");
    }

    #[test]
    fn test_global_ownership_bypasses_group_rules() {
        let gate = AuthorizationGate::new(true);
        let no_groups = actor(vec![]);

        gate.can_register(
            &no_groups,
            &PackageTarget::New {
                group_can_add_package: false,
            },
        )
        .unwrap();

        let owners = [group("other")];
        gate.can_register(&no_groups, &PackageTarget::Existing { owner_groups: &owners[..] })
            .unwrap();
    }

    #[test]
    fn test_new_package_requires_add_package_capability() {
        let gate = AuthorizationGate::new(false);
        let a = actor(vec![group("devs")]);

        gate.can_register(
            &a,
            &PackageTarget::New {
                group_can_add_package: true,
            },
        )
        .unwrap();

        let err = gate
            .can_register(
                &a,
                &PackageTarget::New {
                    group_can_add_package: false,
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("does not have permissions"));
    }

    #[test]
    fn test_existing_package_requires_owner_group() {
        let gate = AuthorizationGate::new(false);
        let devs = group("devs");
        let a = actor(vec![devs.clone()]);

        // Actor's group owns the package
        let owners = [devs.clone()];
        gate.can_upload(&a, &PackageTarget::Existing { owner_groups: &owners[..] })
            .unwrap();

        // Someone else's package
        let owners = [group("ops")];
        let err = gate
            .can_upload(&a, &PackageTarget::Existing { owner_groups: &owners[..] })
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_superuser_may_modify_any_existing_package() {
        let gate = AuthorizationGate::new(false);
        let mut root = actor(vec![group("misc")]);
        root.is_superuser = true;

        let owners = [group("ops")];
        gate.can_register(&root, &PackageTarget::Existing { owner_groups: &owners[..] })
            .unwrap();
    }

    #[test]
    fn test_basic_credentials_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            // base64("alice:s3cret")
            "Basic YWxpY2U6czNjcmV0".parse().unwrap(),
        );
        let (user, pass) = extract_basic_credentials(&headers).unwrap();
        assert_eq!(user, "alice");
        assert_eq!(pass, "s3cret");

        headers.clear();
        assert!(extract_basic_credentials(&headers).is_none());
    }
}
