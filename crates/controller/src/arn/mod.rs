//! Role ARN helpers.
//!
//! STS restricts a `RoleSessionName` to 64 characters out of
//! `[\w+=,.@-]`. [`normalize_role_arn`] maps a role ARN such as
//! `arn:aws:iam::012345678910:role/path/role-name` onto that alphabet by
//! keeping the account id and joining the role path with `.`.

mod error;

use snafu::OptionExt;

pub use self::error::Error;

/// Maximum length of an STS role session name.
pub const ROLE_SESSION_NAME_MAX_SIZE: usize = 64;

const ROLE_ARN_SUFFIX: &str = ":role";

/// Converts `role_arn` into a session name accepted by `AssumeRole`.
///
/// `role_arn_prefix` is the partition prefix (see [`prefix_from_arn`]) that is
/// stripped from the account segment. The last path segment is the most
/// identifying part of a role name, so it is granted every character not
/// needed to keep one character and one separator per leading segment.
///
/// # Errors
///
/// Returns [`Error::InvalidRoleArn`] when `role_arn` has no `/` separated
/// path.
pub fn normalize_role_arn(role_arn: &str, role_arn_prefix: &str) -> Result<String, Error> {
    let parts = role_arn.split('/').collect::<Vec<_>>();
    let (head, path) = parts
        .split_first()
        .filter(|(_, path)| !path.is_empty())
        .context(error::InvalidRoleArnSnafu { role_arn })?;

    let account_id = head.strip_prefix(role_arn_prefix).unwrap_or(*head);
    let account_id = account_id.strip_suffix(ROLE_ARN_SUFFIX).unwrap_or(account_id);
    let account_id = truncate(account_id, ROLE_SESSION_NAME_MAX_SIZE);

    let remaining = ROLE_SESSION_NAME_MAX_SIZE - account_id.len();
    Ok(format!("{account_id}{}", normalize_path(path, remaining)))
}

/// Joins `levels` as `.level1.level2...` within `remaining` characters.
///
/// Given the levels `["aaaaa", "bbbbb", "ccccccc"]` and `12` remaining
/// characters the result is `.a.b.ccccccc`. Leading levels that cannot keep a
/// separator and a single character are dropped.
fn normalize_path(levels: &[&str], remaining: usize) -> String {
    let Some((last, others)) = levels.split_last() else {
        return String::new();
    };
    if remaining < 2 {
        return String::new();
    }

    let last = last.replace(':', "_");
    let max_name = remaining.saturating_sub(others.len() * 2 + 1).max(1);
    let last = truncate(&last, max_name);

    let rest = remaining - last.len() - 1;
    format!("{}.{last}", normalize_path(others, rest))
}

fn truncate(value: &str, max_len: usize) -> &str {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Returns the IAM prefix of the partition `arn` belongs to.
///
/// Given `arn:aws:iam::012345678910:role/role-name` it returns
/// `arn:aws:iam::`.
///
/// # Errors
///
/// Returns [`Error::InvalidArn`] when `arn` is not of the form
/// `arn:partition:service:region:account:resource`.
pub fn prefix_from_arn(arn: &str) -> Result<String, Error> {
    let sections = arn.splitn(6, ':').collect::<Vec<_>>();
    match sections.as_slice() {
        ["arn", partition, _service, _region, _account, _resource] if !partition.is_empty() => {
            Ok(format!("arn:{partition}:iam::"))
        }
        _ => error::InvalidArnSnafu { arn }.fail(),
    }
}

/// Derives the base role ARN (`arn:...:role/`) from the ARN of the instance
/// profile the controller runs under.
///
/// # Errors
///
/// Returns [`Error::InvalidInstanceProfileArn`] when the ARN carries no
/// `/` separated name.
pub fn base_role_arn_from_instance_profile(instance_profile_arn: &str) -> Result<String, Error> {
    let role_arn = instance_profile_arn.replacen("instance-profile", "role", 1);
    match role_arn.split_once('/') {
        Some((head, _)) => Ok(format!("{head}/")),
        None => error::InvalidInstanceProfileArnSnafu { instance_profile_arn }.fail(),
    }
}

/// Resolves `role` against `base_role_arn` unless it is already a full ARN
/// within `role_arn_prefix`.
#[must_use]
pub fn resolve_role_arn(role: &str, base_role_arn: &str, role_arn_prefix: &str) -> String {
    if role.starts_with(role_arn_prefix) {
        role.to_string()
    } else {
        format!("{base_role_arn}{role}")
    }
}
