// src/bundle/classify.rs

//! Split include directives into the user and system archive groups.

use std::collections::BTreeMap;

use crate::fs::expand_home;
use crate::task::IncludeFile;
use crate::types::ArchiveGroup;

/// An include directive normalised for one archive group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    /// Absolute source path or glob pattern, `~/` expanded.
    pub source: String,
    /// Destination relative to the group root (home or `/`). A trailing `/`
    /// marks a directory destination.
    pub dest: String,
    pub optional: bool,
}

/// Partition `includes` by destination: `~/...` goes to the user group,
/// `/...` to the system group.
pub fn classify(
    includes: &[IncludeFile],
) -> Result<BTreeMap<ArchiveGroup, Vec<GroupEntry>>, String> {
    let mut groups: BTreeMap<ArchiveGroup, Vec<GroupEntry>> = BTreeMap::new();

    for inc in includes {
        let source = expand_home(&inc.source).to_string_lossy().into_owned();
        if !source.starts_with('/') {
            return Err(format!(
                "Only absolute or user-relative paths are allowed: {}",
                inc.source
            ));
        }

        let (group, dest) = if let Some(rest) = inc.destination.strip_prefix("~/") {
            (ArchiveGroup::User, rest.trim_start_matches('/'))
        } else if inc.destination.starts_with('/') {
            (ArchiveGroup::System, inc.destination.trim_start_matches('/'))
        } else {
            return Err(format!(
                "Only absolute or user-relative paths are allowed: {}",
                inc.destination
            ));
        };

        groups.entry(group).or_default().push(GroupEntry {
            source,
            dest: dest.to_string(),
            optional: inc.optional,
        });
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::home_dir;

    fn inc(source: &str, destination: &str, optional: bool) -> IncludeFile {
        IncludeFile {
            source: source.to_string(),
            destination: destination.to_string(),
            optional,
        }
    }

    #[test]
    fn destinations_pick_the_group() {
        let groups = classify(&[
            inc("~/.bashrc", "~/.bashrc", false),
            inc("~/.bashrc", "/etc/bashrc", false),
            inc("/etc/bashrc", "~/.bashrc", true),
            inc("/srv/foo.conf", "/etc/foo.conf", false),
        ])
        .unwrap();

        let home_bashrc = home_dir().join(".bashrc").to_string_lossy().into_owned();
        assert_eq!(
            groups[&ArchiveGroup::User],
            vec![
                GroupEntry { source: home_bashrc.clone(), dest: ".bashrc".into(), optional: false },
                GroupEntry { source: "/etc/bashrc".into(), dest: ".bashrc".into(), optional: true },
            ]
        );
        assert_eq!(
            groups[&ArchiveGroup::System],
            vec![
                GroupEntry { source: home_bashrc, dest: "etc/bashrc".into(), optional: false },
                GroupEntry { source: "/srv/foo.conf".into(), dest: "etc/foo.conf".into(), optional: false },
            ]
        );
    }

    #[test]
    fn relative_paths_are_rejected_on_either_side() {
        assert!(classify(&[inc("relative path", "~/.bashrc", false)]).is_err());
        assert!(classify(&[inc("/foobar", ".bashrc", false)]).is_err());
    }

    #[test]
    fn no_includes_means_no_groups() {
        assert!(classify(&[]).unwrap().is_empty());
    }
}
