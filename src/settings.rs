use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::error::AutomationError;
use crate::interaction::DEFAULT_INTERVAL_MS;
use crate::models::batch::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
use crate::models::task::{DEFAULT_DURATION_MS, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES};
use crate::models::{next_batch_index, AppTask, TaskBatch};
use crate::orchestrator::ResumePolicy;
use crate::watchdog::focus::DEFAULT_DISALLOWED_PACKAGES;
use crate::watchdog::DisallowedSurfaces;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub batch_size: usize,
    pub current_batch_index: usize,
    pub default_duration_ms: u64,
    pub interaction_interval_ms: u64,
    pub selected_tasks: Vec<AppTask>,
    /// Packages already run on `last_test_date`.
    pub tested_today: BTreeSet<String>,
    pub last_test_date: Option<NaiveDate>,
    pub disallowed_packages: Vec<String>,
    pub resume_policy: ResumePolicy,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            current_batch_index: 0,
            default_duration_ms: DEFAULT_DURATION_MS,
            interaction_interval_ms: DEFAULT_INTERVAL_MS,
            selected_tasks: Vec::new(),
            tested_today: BTreeSet::new(),
            last_test_date: None,
            disallowed_packages: DEFAULT_DISALLOWED_PACKAGES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            resume_policy: ResumePolicy::default(),
        }
    }
}

impl UserSettings {
    /// Packages run today; anything recorded on an earlier day no longer counts.
    fn tested_on(&self, today: NaiveDate) -> Option<&BTreeSet<String>> {
        (self.last_test_date == Some(today)).then_some(&self.tested_today)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn settings(&self) -> UserSettings {
        self.read().clone()
    }

    fn update(&self, apply: impl FnOnce(&mut UserSettings)) -> Result<()> {
        let mut guard = self.write();
        apply(&mut guard);
        self.persist(&guard)
    }

    pub fn set_batch_size(&self, batch_size: usize) -> Result<()> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(AutomationError::InvalidBatchSize)
                .with_context(|| format!("batch size {batch_size} outside {MIN_BATCH_SIZE}..={MAX_BATCH_SIZE}"));
        }
        self.update(|s| {
            s.batch_size = batch_size;
            s.current_batch_index = 0;
        })
    }

    pub fn set_default_duration_minutes(&self, minutes: u64) -> Result<()> {
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
            bail!("duration {minutes} min outside {MIN_DURATION_MINUTES}..={MAX_DURATION_MINUTES}");
        }
        self.update(|s| s.default_duration_ms = minutes * 60 * 1000)
    }

    pub fn set_interaction_interval_ms(&self, interval_ms: u64) -> Result<()> {
        if interval_ms == 0 {
            bail!("interaction interval must be greater than zero");
        }
        self.update(|s| s.interaction_interval_ms = interval_ms)
    }

    /// Replaces the selection and starts batching from the top.
    pub fn set_selected_tasks(&self, tasks: Vec<AppTask>) -> Result<()> {
        self.update(|s| {
            s.selected_tasks = tasks;
            s.current_batch_index = 0;
        })
    }

    pub fn set_disallowed_packages(&self, packages: Vec<String>) -> Result<()> {
        self.update(|s| s.disallowed_packages = packages)
    }

    pub fn set_resume_policy(&self, policy: ResumePolicy) -> Result<()> {
        self.update(|s| s.resume_policy = policy)
    }

    pub fn current_batch(&self) -> Result<TaskBatch> {
        let data = self.read();
        Ok(TaskBatch::slice(
            &data.selected_tasks,
            data.current_batch_index,
            data.batch_size,
        )?)
    }

    /// Moves to the next batch, wrapping to the first. Returns the new index.
    pub fn advance_batch(&self) -> Result<usize> {
        let mut guard = self.write();
        let total = crate::models::total_batches(guard.selected_tasks.len(), guard.batch_size)?;
        guard.current_batch_index = next_batch_index(guard.current_batch_index, total);
        self.persist(&guard)?;
        Ok(guard.current_batch_index)
    }

    pub fn mark_tested<'a>(
        &self,
        packages: impl IntoIterator<Item = &'a str>,
        today: NaiveDate,
    ) -> Result<()> {
        self.update(|s| {
            if s.last_test_date != Some(today) {
                s.tested_today.clear();
                s.last_test_date = Some(today);
            }
            s.tested_today
                .extend(packages.into_iter().map(str::to_string));
        })
    }

    /// `tasks` minus the packages already run today.
    pub fn filter_untested(&self, tasks: Vec<AppTask>, today: NaiveDate) -> Vec<AppTask> {
        let data = self.read();
        match data.tested_on(today) {
            Some(tested) => tasks
                .into_iter()
                .filter(|t| !tested.contains(&t.package_id))
                .collect(),
            None => tasks,
        }
    }

    pub fn disallowed_surfaces(&self) -> DisallowedSurfaces {
        DisallowedSurfaces::new(self.read().disallowed_packages.iter().cloned())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        (dir, store)
    }

    fn selection(n: usize) -> Vec<AppTask> {
        (0..n)
            .map(|i| AppTask::new(format!("com.example.app{i}"), format!("App {i}"), 60_000).unwrap())
            .collect()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_defaults_when_missing_or_corrupt() {
        let (dir, store) = store();
        let settings = store.settings();
        assert_eq!(settings.batch_size, 20);
        assert_eq!(settings.interaction_interval_ms, 500);
        assert_eq!(settings.resume_policy, ResumePolicy::CurrentTaskOnly);
        assert!(store.disallowed_surfaces().contains("com.android.chrome"));

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.settings(), UserSettings::default());
    }

    #[test]
    fn test_updates_persist_across_reload() {
        let (dir, store) = store();
        store.set_selected_tasks(selection(3)).unwrap();
        store.set_batch_size(2).unwrap();
        store.set_resume_policy(ResumePolicy::RemainingQueue).unwrap();

        let reloaded = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let settings = reloaded.settings();
        assert_eq!(settings.selected_tasks.len(), 3);
        assert_eq!(settings.batch_size, 2);
        assert_eq!(settings.resume_policy, ResumePolicy::RemainingQueue);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"batchSize": 5}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.default_duration_ms, DEFAULT_DURATION_MS);
    }

    #[test]
    fn test_batch_size_and_duration_ranges() {
        let (_dir, store) = store();
        assert!(store.set_batch_size(0).is_err());
        assert!(store.set_batch_size(51).is_err());
        assert!(store.set_default_duration_minutes(0).is_err());
        assert!(store.set_default_duration_minutes(61).is_err());

        assert!(store.set_interaction_interval_ms(0).is_err());

        store.set_default_duration_minutes(5).unwrap();
        assert_eq!(store.settings().default_duration_ms, 300_000);
    }

    #[test]
    fn test_batches_advance_and_wrap() {
        let (_dir, store) = store();
        store.set_selected_tasks(selection(5)).unwrap();
        store.set_batch_size(2).unwrap();

        let batch = store.current_batch().unwrap();
        assert_eq!(batch.total_batches, 3);
        assert_eq!(batch.tasks()[0].package_id, "com.example.app0");

        assert_eq!(store.advance_batch().unwrap(), 1);
        assert_eq!(store.advance_batch().unwrap(), 2);
        assert_eq!(store.current_batch().unwrap().len(), 1);
        assert_eq!(store.advance_batch().unwrap(), 0);
    }

    #[test]
    fn test_tested_set_resets_on_new_day() {
        let (_dir, store) = store();
        let tasks = selection(3);

        store
            .mark_tested(["com.example.app0", "com.example.app2"], day(1))
            .unwrap();
        let untested = store.filter_untested(tasks.clone(), day(1));
        assert_eq!(untested.len(), 1);
        assert_eq!(untested[0].package_id, "com.example.app1");

        assert_eq!(store.filter_untested(tasks.clone(), day(2)).len(), 3);

        store.mark_tested(["com.example.app1"], day(2)).unwrap();
        let settings = store.settings();
        assert_eq!(settings.last_test_date, Some(day(2)));
        assert_eq!(settings.tested_today.len(), 1);
    }
}
