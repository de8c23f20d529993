//! Replay of shadow operation scripts against the in-memory collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use layerfs_core::branch::{BranchList, BranchPerm};
use layerfs_core::hnotify::MemoryNotifier;
use layerfs_core::iinfo::{BranchIdentity, InodeInfo};
use layerfs_core::inode::{MemInode, MemWhiteout};
use layerfs_core::sbinfo::SuperBlock;
use layerfs_core::stats::StatsSnapshot;
use layerfs_core::traits::RealInode;
use layerfs_core::types::{BranchId, BranchRange, Ino, MountOptions, SlotFlags};
use layerfs_core::xino::MemoryXino;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct Script {
    /// Mount option string, overridden by the command line
    #[serde(default)]
    pub options: Option<String>,
    pub branches: Vec<BranchSpec>,
    /// Virtual inode number the operations apply to
    #[serde(default = "default_ino")]
    pub ino: Ino,
    pub ops: Vec<Op>,
}

fn default_ino() -> Ino {
    1
}

#[derive(Debug, Deserialize)]
pub struct BranchSpec {
    pub path: String,
    #[serde(default = "default_perm")]
    pub perm: BranchPerm,
}

fn default_perm() -> BranchPerm {
    BranchPerm::Rw
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Set {
        bindex: usize,
        h_ino: Ino,
        #[serde(default)]
        dir: bool,
    },
    Clear {
        bindex: usize,
    },
    Whiteout {
        bindex: usize,
        name: String,
    },
    /// Drops the link count of a branch inode to zero.
    Unlink {
        h_ino: Ino,
    },
    Recompute {
        #[serde(default)]
        put_zero: bool,
    },
    Resize {
        nbr: usize,
    },
    AddBranch {
        bindex: usize,
        path: String,
        #[serde(default = "default_perm")]
        perm: BranchPerm,
    },
    DelBranch {
        bindex: usize,
    },
    SetPerm {
        bindex: usize,
        perm: BranchPerm,
    },
    Revalidate,
    Finalize {
        #[serde(default)]
        unlinked: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct SlotReport {
    pub bindex: usize,
    pub h_ino: Option<Ino>,
    pub branch: BranchId,
    pub whiteout: Option<String>,
    pub watched: bool,
    pub identity: String,
}

#[derive(Debug, Serialize)]
pub struct BranchReport {
    pub id: BranchId,
    pub path: String,
    pub perm: BranchPerm,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub ino: Ino,
    pub options: String,
    pub branches: Vec<BranchReport>,
    pub finalized: bool,
    pub range: Option<BranchRange>,
    pub generation: u64,
    pub stale: bool,
    pub slots: Vec<SlotReport>,
    pub xino_entries: usize,
    pub active_watches: usize,
    pub stats: StatsSnapshot,
}

/// Runs `script` under `options` and reports the final shadow state.
pub fn replay(script: &Script, options: MountOptions) -> Result<Report> {
    let branches = Arc::new(BranchList::with_branches(
        script.branches.iter().map(|b| (b.path.clone(), b.perm)),
    ));
    let xino = Arc::new(MemoryXino::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let sb = Arc::new(
        SuperBlock::new(options.clone(), branches.clone())
            .with_xino(xino.clone())
            .with_notifier(notifier.clone()),
    );

    let mut info = Some(InodeInfo::new(script.ino, &sb)?);
    let mut inodes: HashMap<Ino, Arc<MemInode>> = HashMap::new();

    for (step, op) in script.ops.iter().enumerate() {
        debug!(step, ?op, "replaying");
        let Some(current) = info.as_ref() else {
            bail!("step {}: inode already finalized", step);
        };

        match op {
            Op::Set { bindex, h_ino, dir } => {
                let inode = inodes
                    .entry(*h_ino)
                    .or_insert_with(|| Arc::new(MemInode::new(*h_ino, *dir)));
                let mut ii = current.write();
                check_bindex(step, *bindex, ii.nbr())?;
                ii.set_h_inode(*bindex, Some(inode.as_ref_counted()), sb.hi_flags(inode.is_dir()));
            }
            Op::Clear { bindex } => {
                let mut ii = current.write();
                check_bindex(step, *bindex, ii.nbr())?;
                ii.set_h_inode(*bindex, None, SlotFlags::empty());
            }
            Op::Whiteout { bindex, name } => {
                let mut ii = current.write();
                check_bindex(step, *bindex, ii.nbr())?;
                if ii.whiteout(*bindex).is_some() {
                    bail!("step {}: bindex {} already has a whiteout", step, bindex);
                }
                ii.set_whiteout(*bindex, MemWhiteout::masking(name).as_ref_counted());
            }
            Op::Unlink { h_ino } => {
                let inode = inodes
                    .get(h_ino)
                    .with_context(|| format!("step {}: unknown branch inode {}", step, h_ino))?;
                inode.set_nlink(0);
            }
            Op::Recompute { put_zero } => current.write().update_brange(*put_zero),
            Op::Resize { nbr } => {
                let mut ii = current.write();
                if let Some(bend) = ii.bend() {
                    if *nbr <= bend {
                        bail!("step {}: resize to {} slots would drop bindex {} below bend", step, nbr, bend);
                    }
                }
                ii.realloc(*nbr)?;
            }
            Op::AddBranch { bindex, path, perm } => {
                let _si = sb.si_write();
                branches.insert(*bindex, path.as_str(), *perm)?;
                current.write().add_branch_slot(*bindex)?;
                sb.bump_generation();
            }
            Op::DelBranch { bindex } => {
                let _si = sb.si_write();
                let removed = branches.remove(*bindex)?;
                current.write().del_branch_slot(*bindex)?;
                let forgotten = xino.forget_branch(removed.id);
                debug!(br = %removed.id, forgotten, "branch removed");
                sb.bump_generation();
            }
            Op::SetPerm { bindex, perm } => {
                let _si = sb.si_write();
                branches.set_perm(*bindex, *perm)?;
                sb.bump_generation();
            }
            Op::Revalidate => current.update_generation(sb.generation()),
            Op::Finalize { unlinked } => {
                if let Some(done) = info.take() {
                    done.finalize(*unlinked);
                }
            }
        }
    }

    let mut report = Report {
        ino: script.ino,
        options: options.to_string(),
        branches: branches
            .snapshot()
            .into_iter()
            .map(|br| BranchReport {
                id: br.id,
                path: br.path.display().to_string(),
                perm: br.perm,
            })
            .collect(),
        finalized: info.is_none(),
        range: None,
        generation: sb.generation(),
        stale: false,
        slots: Vec::new(),
        xino_entries: 0,
        active_watches: 0,
        stats: StatsSnapshot::default(),
    };

    if let Some(info) = info.as_ref() {
        let ii = info.read();
        report.range = ii.range();
        report.stale = info.is_stale(sb.generation());
        report.slots = (0..ii.nbr())
            .filter_map(|bindex| {
                let hinode = ii.hinode(bindex)?;
                if !hinode.is_populated() && hinode.whiteout().is_none() {
                    return None;
                }
                let identity = match ii.branch_identity(bindex, sb.branches()) {
                    BranchIdentity::Unset => "unset".to_string(),
                    BranchIdentity::Match => "match".to_string(),
                    BranchIdentity::Moved { now_at, .. } => format!("moved to {}", now_at),
                    BranchIdentity::Gone { .. } => "gone".to_string(),
                };
                Some(SlotReport {
                    bindex,
                    h_ino: hinode.inode().map(|h| h.ino()),
                    branch: hinode.id(),
                    whiteout: hinode.whiteout().map(|w| w.name().to_string()),
                    watched: hinode.watch().is_some(),
                    identity,
                })
            })
            .collect();
    }
    report.xino_entries = xino.len();
    report.active_watches = notifier.active_watches();
    report.stats = sb.stats().snapshot();

    info!(
        ino = report.ino,
        steps = script.ops.len(),
        finalized = report.finalized,
        "replay complete"
    );
    Ok(report)
}

fn check_bindex(step: usize, bindex: usize, nbr: usize) -> Result<()> {
    if bindex >= nbr {
        bail!("step {}: bindex {} out of range ({} slots)", step, bindex, nbr);
    }
    Ok(())
}
