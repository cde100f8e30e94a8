use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::asar;
use super::guard::PathGuards;
use super::open_asar::{self, Consent, OpenAsarArchive};
use super::scuffed::ScuffedDetector;
use super::staging::{copy_staged, discard_parked, park, sweep_temp_files, write_staged};
use crate::core::build::VerifiedBuild;
use crate::core::error::{classify_io, InstallerError, InstallerResult};
use crate::core::install::{Install, BACKUP_FILE, ENTRY_FILE};

/// How an unpatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnpatchOutcome {
    /// The original archive is back in place.
    Restored,
    /// No backup existed; a recovery stub was written instead.
    StubWritten,
}

// ── Rollback ────────────────────────────────────────────

enum Undo {
    Remove(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
}

/// Undoes the steps of an operation unless it is committed.
#[derive(Default)]
struct Rollback {
    steps: Vec<Undo>,
}

impl Rollback {
    fn push(&mut self, undo: Undo) {
        self.steps.push(undo);
    }

    fn commit(mut self) {
        self.steps.clear();
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        while let Some(step) = self.steps.pop() {
            let result = match &step {
                Undo::Remove(path) => fs::remove_file(path),
                Undo::Rename { from, to } => fs::rename(from, to),
            };
            if let Err(e) = result {
                warn!("Rollback step failed: {}", e);
            }
        }
    }
}

// ── Engine ──────────────────────────────────────────────

/// Applies and reverses modifications on a Discord install.
///
/// All operations are synchronous and serialized per install path.
pub struct PatchEngine {
    scuffed: ScuffedDetector,
    guards: PathGuards,
}

impl PatchEngine {
    pub fn new(scuffed: ScuffedDetector) -> Self {
        Self {
            scuffed,
            guards: PathGuards::new(),
        }
    }

    /// Refuses with `ScuffedInstall` while a misplaced install exists.
    pub fn scuffed_check(&self) -> InstallerResult<()> {
        match self.scuffed.check() {
            Some(folder) => Err(InstallerError::ScuffedInstall { folder }),
            None => Ok(()),
        }
    }

    /// Re-read the patched state from disk into `install`.
    ///
    /// Patched means a backup exists, or the entry is a loader archive whose
    /// backup went missing.
    pub fn refresh_patched(&self, install: &mut Install) -> bool {
        let patched = install.primary_resources().is_some_and(patched_on_disk);
        install.set_patched(patched);
        patched
    }

    /// Re-read the OpenAsar marker from disk into `install`.
    pub fn refresh_open_asar(&self, install: &mut Install) -> bool {
        let installed = open_asar::is_open_asar_installed(install);
        install.set_open_asar(installed);
        installed
    }

    #[instrument(skip_all, fields(install = %install.path().display()))]
    pub fn patch(&self, install: &mut Install, build: &VerifiedBuild) -> InstallerResult<()> {
        self.scuffed_check()?;
        let key = install.path().to_path_buf();
        self.guards.with_lock(&key, || {
            let resources = resources_of(install)?;
            sweep_temp_files(&resources);
            self.refresh_patched(install);
            patch_resources(&resources, install.path(), build)?;
            install.set_patched(true);
            self.refresh_open_asar(install);
            info!("Patched {} with build {}", install.label(), build.hash());
            Ok(())
        })
    }

    #[instrument(skip_all, fields(install = %install.path().display()))]
    pub fn unpatch(&self, install: &mut Install) -> InstallerResult<UnpatchOutcome> {
        self.scuffed_check()?;
        let key = install.path().to_path_buf();
        self.guards.with_lock(&key, || {
            let resources = resources_of(install)?;
            // Another handle to this install may have unpatched it already.
            if !self.refresh_patched(install) {
                return Err(InstallerError::NotPatched(install.path().to_path_buf()));
            }
            sweep_temp_files(&resources);
            let outcome = unpatch_resources(&resources, install.path())?;
            install.set_patched(false);
            self.refresh_open_asar(install);
            info!("Unpatched {} ({:?})", install.label(), outcome);
            Ok(outcome)
        })
    }

    /// Put OpenAsar into the install's host archive slot.
    #[instrument(skip_all, fields(install = %install.path().display()))]
    pub fn install_open_asar(
        &self,
        install: &mut Install,
        archive: &OpenAsarArchive,
        _consent: Consent,
    ) -> InstallerResult<()> {
        self.scuffed_check()?;
        let key = install.path().to_path_buf();
        self.guards.with_lock(&key, || {
            let resources = resources_of(install)?;
            let root = install.path().to_path_buf();
            let slot = open_asar::slot_path(&resources);
            let original = open_asar::original_path(&slot);

            let mut rollback = Rollback::default();
            if !original.exists() {
                copy_staged(&slot, &original, &root)?;
                rollback.push(Undo::Remove(original.clone()));
            }
            write_staged(&slot, archive.bytes(), &root)?;
            rollback.commit();

            self.refresh_open_asar(install);
            info!("Installed OpenAsar on {}", install.label());
            Ok(())
        })
    }

    /// Restore the host archive OpenAsar replaced.
    #[instrument(skip_all, fields(install = %install.path().display()))]
    pub fn uninstall_open_asar(&self, install: &mut Install) -> InstallerResult<UnpatchOutcome> {
        self.scuffed_check()?;
        let key = install.path().to_path_buf();
        self.guards.with_lock(&key, || {
            if !self.refresh_open_asar(install) {
                return Err(InstallerError::NotPatched(install.path().to_path_buf()));
            }
            let resources = resources_of(install)?;
            let root = install.path().to_path_buf();
            let slot = open_asar::slot_path(&resources);
            let original = open_asar::original_path(&slot);

            let outcome = if original.is_file() {
                fs::rename(&original, &slot).map_err(|e| classify_io(e, &slot, &root))?;
                UnpatchOutcome::Restored
            } else {
                warn!("No OpenAsar backup at {:?}, writing recovery stub", original);
                write_staged(&slot, &asar::recovery_stub()?, &root)?;
                UnpatchOutcome::StubWritten
            };

            self.refresh_open_asar(install);
            info!("Uninstalled OpenAsar from {} ({:?})", install.label(), outcome);
            Ok(outcome)
        })
    }
}

fn resources_of(install: &Install) -> InstallerResult<PathBuf> {
    install
        .primary_resources()
        .map(Path::to_path_buf)
        .ok_or_else(|| InstallerError::InvalidLocation(install.path().to_path_buf()))
}

/// Loader archives are a few hundred bytes; anything bigger is Discord's own.
const MAX_LOADER_LEN: u64 = 64 * 1024;

fn entry_is_loader(entry: &Path) -> bool {
    let small = fs::metadata(entry)
        .map(|m| m.is_file() && m.len() <= MAX_LOADER_LEN)
        .unwrap_or(false);
    small && fs::read(entry).is_ok_and(|bytes| asar::is_loader_stub(&bytes))
}

fn patched_on_disk(resources: &Path) -> bool {
    resources.join(BACKUP_FILE).exists() || entry_is_loader(&resources.join(ENTRY_FILE))
}

/// Park the unpacked app directory at `entry`, run `write`, and put the
/// directory back if `write` fails.
fn replace_unpacked(
    entry: &Path,
    root: &Path,
    write: impl FnOnce() -> InstallerResult<()>,
) -> InstallerResult<()> {
    let parked = park(entry, root)?;
    let mut rollback = Rollback::default();
    rollback.push(Undo::Rename {
        from: parked.clone(),
        to: entry.to_path_buf(),
    });
    write()?;
    rollback.commit();
    discard_parked(&parked);
    Ok(())
}

fn patch_resources(resources: &Path, root: &Path, build: &VerifiedBuild) -> InstallerResult<()> {
    let entry = resources.join(ENTRY_FILE);
    let backup = resources.join(BACKUP_FILE);
    let stub = asar::loader_stub(build.patcher_path())?;
    let mut rollback = Rollback::default();

    if backup.exists() {
        if entry.is_dir() {
            // Old installs shipped an unpacked app directory next to the backup.
            return replace_unpacked(&entry, root, || write_staged(&entry, &stub, root));
        }
    } else if entry_is_loader(&entry) {
        warn!("{:?} is a loader without a backup, rewriting it only", entry);
    } else if entry.is_dir() {
        fs::rename(&entry, &backup).map_err(|e| classify_io(e, &entry, root))?;
        rollback.push(Undo::Rename {
            from: backup.clone(),
            to: entry.clone(),
        });
        debug!("Moved unpacked app directory to {:?}", backup);
    } else if entry.is_file() {
        copy_staged(&entry, &backup, root)?;
        rollback.push(Undo::Remove(backup.clone()));
        debug!("Backed up {:?}", entry);

        // OpenAsar's original moves along with the host archive.
        let open_asar_original = open_asar::original_path(&entry);
        if open_asar_original.is_file() {
            let moved = open_asar::original_path(&backup);
            fs::rename(&open_asar_original, &moved)
                .map_err(|e| classify_io(e, &open_asar_original, root))?;
            rollback.push(Undo::Rename {
                from: moved,
                to: open_asar_original,
            });
        }
    } else {
        return Err(InstallerError::InvalidLocation(resources.to_path_buf()));
    }

    write_staged(&entry, &stub, root)?;
    rollback.commit();
    Ok(())
}

fn unpatch_resources(resources: &Path, root: &Path) -> InstallerResult<UnpatchOutcome> {
    let entry = resources.join(ENTRY_FILE);
    let backup = resources.join(BACKUP_FILE);

    if backup.is_dir() {
        if entry.exists() {
            let parked = park(&entry, root)?;
            let mut rollback = Rollback::default();
            rollback.push(Undo::Rename {
                from: parked.clone(),
                to: entry.clone(),
            });
            fs::rename(&backup, &entry).map_err(|e| classify_io(e, &backup, root))?;
            rollback.commit();
            discard_parked(&parked);
        } else {
            fs::rename(&backup, &entry).map_err(|e| classify_io(e, &backup, root))?;
        }
        return Ok(UnpatchOutcome::Restored);
    }

    if backup.is_file() {
        let mut rollback = Rollback::default();
        let open_asar_original = open_asar::original_path(&backup);
        if open_asar_original.is_file() {
            let moved = open_asar::original_path(&entry);
            fs::rename(&open_asar_original, &moved)
                .map_err(|e| classify_io(e, &open_asar_original, root))?;
            rollback.push(Undo::Rename {
                from: moved,
                to: open_asar_original,
            });
        }
        // Rename keeps the restored bytes identical and consumes the backup.
        fs::rename(&backup, &entry).map_err(|e| classify_io(e, &entry, root))?;
        rollback.commit();
        return Ok(UnpatchOutcome::Restored);
    }

    warn!("No backup in {:?}, writing recovery stub", resources);
    let stub = asar::recovery_stub()?;
    if entry.is_dir() {
        replace_unpacked(&entry, root, || write_staged(&entry, &stub, root))?;
    } else {
        write_staged(&entry, &stub, root)?;
    }
    Ok(UnpatchOutcome::StubWritten)
}
