use binding_mirror_k8s_api::{ResourceExt, RoleBinding};
use once_cell::sync::Lazy;
use regex::Regex;

/// Subjects of this kind prefix are considered group grants.
const GROUP_KIND_PREFIX: &str = "Group";

/// Matches a subject name that begins with a common-name component, e.g.
/// `CN=payments-devops,OU=Groups,DC=example,DC=com`.
static COMMON_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CN=([^,]+)").expect("common name pattern must compile"));

/// The group memberships granted by a role binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedGrant {
    pub name: String,
    pub namespace: String,

    /// Subject names of matching groups, in subject order.
    pub groups: Vec<String>,

    /// The common name of each entry in `groups`, at the same index.
    pub common_names: Vec<String>,

    pub classification: Classification,
    pub action: Action,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    Admin,
    DevOps,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Add,
    Update,
    Delete,
}

/// Common names that left and joined a grant between two versions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

// === impl ParsedGrant ===

impl ParsedGrant {
    /// Extracts the distinguished-name groups from a binding's subjects.
    ///
    /// Subjects that are not groups, or whose names do not begin with a
    /// `CN=` component, are skipped. The classification is taken from the
    /// last matching subject.
    pub fn parse(binding: &RoleBinding, action: Action) -> Self {
        let mut grant = Self {
            name: binding.name_any(),
            namespace: binding.namespace().unwrap_or_default(),
            groups: Vec::new(),
            common_names: Vec::new(),
            classification: Classification::DevOps,
            action,
        };

        for subject in binding.subjects.iter().flatten() {
            if !subject.kind.starts_with(GROUP_KIND_PREFIX) {
                continue;
            }
            let Some(cn) = common_name(&subject.name) else {
                continue;
            };
            grant.groups.push(subject.name.clone());
            grant.common_names.push(cn.to_string());
            grant.classification = Classification::of_group(&subject.name);
        }

        grant
    }

    pub fn is_devops(&self) -> bool {
        self.classification == Classification::DevOps
    }

    /// Returns the group whose common name is `cn`.
    pub fn group_for(&self, cn: &str) -> Option<&str> {
        self.common_names
            .iter()
            .position(|c| c == cn)
            .map(|i| self.groups[i].as_str())
    }

    /// Computes which common names were dropped from `self` and which were
    /// introduced by `new`. Names present in both are omitted.
    pub fn diff(&self, new: &Self) -> MembershipDiff {
        MembershipDiff {
            removed: difference(&self.common_names, &new.common_names),
            added: difference(&new.common_names, &self.common_names),
        }
    }
}

// === impl Classification ===

impl Classification {
    fn of_group(name: &str) -> Self {
        if name.to_ascii_lowercase().contains("admin") {
            Self::Admin
        } else {
            Self::DevOps
        }
    }
}

fn common_name(subject_name: &str) -> Option<&str> {
    COMMON_NAME
        .captures(subject_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Names in `a` that are not in `b`, deduplicated, in `a`'s order.
fn difference(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for name in a {
        if !b.contains(name) && !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}
