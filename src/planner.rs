use std::{collections::HashSet, path::Path};

use chrono::Datelike;
use log::{debug, info, warn};

use crate::{
    index::DocumentIndex,
    metadata::{relative, Document},
    redirects::RedirectRule,
};

mod data;
mod utils;

pub(crate) use data::{Mutation, Plan, SkipReason};
pub(crate) use utils::{resolve, same_location};

/// Plans `key: <new id>` for every redirect whose old id resolves to exactly
/// one document of `index`.
pub(crate) fn plan_field_updates(rules: &[RedirectRule], index: &DocumentIndex, key: &str) -> Plan {
    let mut plan = Plan::default();
    let mut targeted = HashSet::new();

    for rule in rules {
        let candidates = index.lookup(&rule.old_id);
        let doc = match candidates.as_slice() {
            [] => {
                info!(
                    "No post has {}: {}, skipping /{}/{}/{}/{} -> {}",
                    index.key(),
                    rule.old_id,
                    rule.year,
                    rule.month,
                    rule.day,
                    rule.old_id,
                    rule.new_id
                );
                plan.skip(&rule.old_id, SkipReason::NotFound);
                continue;
            }
            [doc] => *doc,
            many => {
                warn!(
                    "{} posts share {}: {}, cannot tell which one redirects to {}; skipping",
                    many.len(),
                    index.key(),
                    rule.old_id,
                    rule.new_id
                );
                for candidate in many {
                    warn!("  candidate: {:?}", candidate.path);
                }
                plan.skip(
                    &rule.old_id,
                    SkipReason::Ambiguous(many.iter().map(|d| d.path.clone()).collect()),
                );
                continue;
            }
        };

        if targeted.contains(&doc.path) {
            warn!(
                "{:?} is already targeted by another redirect, skipping {} -> {}",
                doc.path, rule.old_id, rule.new_id
            );
            plan.skip(&rule.old_id, SkipReason::DuplicateTarget);
            continue;
        }

        let Some(front_matter) = doc.front_matter() else {
            plan.skip(&rule.old_id, SkipReason::NoFrontMatter);
            continue;
        };
        let previous = front_matter.get(key);
        if previous.as_deref() == Some(rule.new_id.as_str()) {
            debug!("{:?} already has {key}: {}", doc.path, rule.new_id);
            plan.skip(&rule.old_id, SkipReason::UpToDate);
            continue;
        }

        targeted.insert(doc.path.clone());
        plan.mutations.push(Mutation::SetField {
            path: doc.path.clone(),
            key: key.to_string(),
            value: rule.new_id.clone(),
            previous,
        });
    }

    plan
}

/// Plans moving each document to `<posts_root>/<YYYY>/<MM>/` according to
/// its `date_key`, together with the resource directory named after it.
pub(crate) fn plan_relocations(documents: &[Document], posts_root: &Path, date_key: &str) -> Plan {
    let mut plan = Plan::default();

    for doc in documents {
        let subject = doc.display_path(posts_root).display().to_string();
        let Some(front_matter) = doc.front_matter() else {
            info!("{subject}: no front-matter, skipping");
            plan.skip(subject, SkipReason::NoFrontMatter);
            continue;
        };
        let Some(date) = front_matter.date(date_key) else {
            info!("{subject}: no usable `{date_key}`, skipping");
            plan.skip(subject, SkipReason::NoDate);
            continue;
        };
        let (Some(file_name), Some(stem)) = (doc.path.file_name(), doc.path.file_stem()) else {
            warn!("{subject}: path has no file name, skipping");
            plan.skip(subject, SkipReason::NoFileName);
            continue;
        };

        let target_dir = posts_root
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()));
        let mut planned = false;

        let new_path = target_dir.join(file_name);
        if !same_location(&doc.path, &new_path) {
            plan.mutations.push(Mutation::MoveFile {
                from: doc.path.clone(),
                to: new_path,
            });
            planned = true;
        }

        let resources = doc.path.with_file_name(stem);
        if resources.is_dir() {
            let new_resources = target_dir.join(stem);
            let (from, to) = (resolve(&resources), resolve(&new_resources));
            if from == to {
                // already in place
            } else if to.starts_with(&from) {
                let folder = relative(&resources, posts_root).display().to_string();
                warn!("{folder}/: target {:?} lies inside it, not moving", new_resources);
                plan.skip(folder, SkipReason::InsideItself);
            } else {
                plan.mutations.push(Mutation::MoveDir {
                    from: resources,
                    to: new_resources,
                });
                planned = true;
            }
        }

        if !planned {
            debug!("{subject}: already in place");
            plan.skip(subject, SkipReason::UpToDate);
        }
    }

    plan
}
