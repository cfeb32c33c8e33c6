//! Card profile storage
//!
//! Locates and persists `profile.json`.

use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};

use super::profile::{CardProfile, ProfileError};

/// Handles persistent storage of the card profile
pub struct ProfileStore {
    profile_dir: PathBuf,
    profile_file: PathBuf,
    pub profile: CardProfile,
}

impl ProfileStore {
    const PROFILE_FILE: &'static str = "profile.json";

    /// Get the default profile directory
    fn default_profile_dir() -> PathBuf {
        if let Ok(path) = std::env::var("GPCARD_PROFILE_DIR") {
            return PathBuf::from(path);
        }
        if let Some(config) = dirs::config_dir() {
            return config.join("gpcard");
        }
        PathBuf::from("/etc/gpcard")
    }

    /// Create a store rooted at `profile_dir`, or the default directory
    pub fn new(profile_dir: Option<PathBuf>) -> Self {
        let profile_dir = profile_dir.unwrap_or_else(Self::default_profile_dir);
        let profile_file = profile_dir.join(Self::PROFILE_FILE);

        Self {
            profile_dir,
            profile_file,
            profile: CardProfile::default(),
        }
    }

    pub fn profile_file(&self) -> &Path {
        &self.profile_file
    }

    /// Read the profile file, without falling back
    pub fn read(&self) -> Result<CardProfile, ProfileError> {
        let content = fs::read_to_string(&self.profile_file)?;
        CardProfile::from_json(&content)
    }

    /// Load the profile from storage
    ///
    /// Returns true if the profile was loaded, false if the default profile
    /// is used instead
    pub fn load(&mut self) -> bool {
        if !self.profile_file.exists() {
            info!("No card profile at {:?}, using the default", self.profile_file);
            self.profile = CardProfile::default();
            return false;
        }

        match self.read() {
            Ok(profile) => {
                self.profile = profile;
                info!("Loaded card profile from {:?}", self.profile_file);
                true
            }
            Err(e) => {
                warn!("{}", e);
                self.profile = CardProfile::default();
                false
            }
        }
    }

    /// Save the profile to storage
    pub fn save(&self) -> bool {
        if let Err(e) = fs::create_dir_all(&self.profile_dir) {
            warn!("Failed to create profile directory: {}", e);
            return false;
        }

        let json = match self.profile.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize card profile: {}", e);
                return false;
            }
        };
        match fs::write(&self.profile_file, json) {
            Ok(()) => {
                debug!("Saved card profile to {:?}", self.profile_file);
                true
            }
            Err(e) => {
                warn!("Failed to write card profile: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_profile_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ProfileStore::new(Some(temp_dir.path().to_path_buf()));

        assert!(!store.load());
        assert_eq!(store.profile, CardProfile::default());
        assert!(matches!(store.read(), Err(ProfileError::Io(_))));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested");
        let mut store = ProfileStore::new(Some(dir.clone()));
        store.profile = CardProfile::sample();
        assert!(store.save());
        assert!(store.profile_file().ends_with("profile.json"));

        let mut store2 = ProfileStore::new(Some(dir));
        assert!(store2.load());
        assert_eq!(store2.profile, CardProfile::sample());
    }

    #[test]
    fn test_invalid_profile_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("profile.json"), "{ not json").unwrap();

        let mut store = ProfileStore::new(Some(temp_dir.path().to_path_buf()));
        store.profile = CardProfile::sample();
        assert!(!store.load());
        assert_eq!(store.profile, CardProfile::default());
        assert!(matches!(store.read(), Err(ProfileError::Json(_))));
    }
}
