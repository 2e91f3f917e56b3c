//! Platform → release → package selection
//!
//! [`SelectionController`] owns the user's choices and the three fetch slots
//! that back them. Operations only start fetches; results come back as
//! events that the control loop hands to [`SelectionController::apply`]:
//!
//! ```ignore
//! controller.load_platforms();
//! while !matches!(controller.wait_update().await, SelectionUpdate::PlatformsLoaded(_)) {}
//! controller.choose_platform(0)?;
//! ```
//!
//! Every state change happens inside one `&mut self` call, so choosing a new
//! platform clears the release and package in the same step.

use crate::cache::ArtifactCache;
use crate::catalog::{self, Platform, Release};
use crate::error::{Error, Result, SelectionError};
use crate::fetch::{ArtifactFetcher, FetchSlot, FetchStatus, SlotEvent};
use crate::package::{verify_checksum, FirmwarePackage, PackageResolver};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// Fetch channels used by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionSlot {
    /// Platform catalog
    Platforms,
    /// Release list of the chosen platform
    Releases,
    /// Firmware package of the chosen release
    Package,
}

/// Selection phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase {
    /// Nothing chosen
    Idle,
    /// A platform is chosen
    PlatformChosen,
    /// A release is chosen
    ReleaseChosen,
    /// The package was downloaded and is being validated
    PackageFetched,
    /// A validated package is ready to flash
    ValidatedReady,
}

impl SelectionPhase {
    /// Phase name for messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PlatformChosen => "a platform is chosen",
            Self::ReleaseChosen => "a release is chosen",
            Self::PackageFetched => "a package is being validated",
            Self::ValidatedReady => "a package is ready",
        }
    }
}

/// The current choices
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    /// Chosen platform
    pub platform: Option<Platform>,
    /// Chosen release
    pub release: Option<Release>,
    /// Validated package of the chosen release
    pub package: Option<FirmwarePackage>,
}

/// What applying an event changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionUpdate {
    /// The platform list was replaced; carries the entry count
    PlatformsLoaded(usize),
    /// The release list was replaced; carries the entry count
    ReleasesLoaded(usize),
    /// A validated package is ready
    PackageReady,
    /// A fetch or validation failed; see [`SelectionController::last_error`]
    Failed(String),
    /// A fetch was cancelled
    Cancelled,
    /// The event belonged to a superseded request and was ignored
    Stale,
}

/// Drives catalog browsing and package download
pub struct SelectionController {
    fetcher: ArtifactFetcher,
    catalog_url: Url,
    phase: SelectionPhase,
    state: SelectionState,
    platforms: Vec<Platform>,
    releases: Vec<Release>,
    release_list_url: Option<Url>,
    last_error: Option<String>,
    platforms_slot: FetchSlot<SelectionSlot>,
    releases_slot: FetchSlot<SelectionSlot>,
    package_slot: FetchSlot<SelectionSlot>,
    events_tx: mpsc::UnboundedSender<SlotEvent<SelectionSlot>>,
    events_rx: mpsc::UnboundedReceiver<SlotEvent<SelectionSlot>>,
}

impl SelectionController {
    /// Create an idle controller browsing the catalog at `catalog_url`
    pub fn new(fetcher: ArtifactFetcher, catalog_url: Url) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            fetcher,
            catalog_url,
            phase: SelectionPhase::Idle,
            state: SelectionState::default(),
            platforms: Vec::new(),
            releases: Vec::new(),
            release_list_url: None,
            last_error: None,
            platforms_slot: FetchSlot::new(SelectionSlot::Platforms),
            releases_slot: FetchSlot::new(SelectionSlot::Releases),
            package_slot: FetchSlot::new(SelectionSlot::Package),
            events_tx,
            events_rx,
        }
    }

    /// Current phase
    pub fn phase(&self) -> SelectionPhase {
        self.phase
    }

    /// Current choices
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Known platforms
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    /// Releases of the chosen platform
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    /// Most recent failure, cleared when a new download starts
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Validated package, once the phase is [`SelectionPhase::ValidatedReady`]
    pub fn package(&self) -> Option<&FirmwarePackage> {
        self.state.package.as_ref()
    }

    /// Cache used by the underlying fetcher
    pub fn cache(&self) -> &Arc<ArtifactCache> {
        self.fetcher.cache()
    }

    /// Whether any fetch is outstanding
    pub fn is_busy(&self) -> bool {
        self.platforms_slot.is_pending()
            || self.releases_slot.is_pending()
            || self.package_slot.is_pending()
    }

    /// Fetch the platform catalog and reset every choice
    pub fn load_platforms(&mut self) {
        self.deselect_platform();
        self.platforms.clear();
        self.last_error = None;
        log::info!("Loading platforms from {}", self.catalog_url);
        self.platforms_slot
            .issue(&self.fetcher, self.catalog_url.clone(), true, &self.events_tx);
    }

    /// Flush the cache, then [`load_platforms`](Self::load_platforms)
    pub fn reload(&mut self) {
        self.cache().flush();
        self.load_platforms();
    }

    /// Choose the platform at `index` and fetch its release list
    ///
    /// An index past the end deselects the platform.
    pub fn choose_platform(&mut self, index: usize) -> Result<()> {
        let Some(platform) = self.platforms.get(index).cloned() else {
            log::debug!("Platform index {} out of range, deselecting", index);
            self.deselect_platform();
            return Ok(());
        };
        let url = join(&self.catalog_url, &platform.url)?;

        self.deselect_platform();
        log::info!("Selected platform {}", platform.name);
        self.state.platform = Some(platform);
        self.phase = SelectionPhase::PlatformChosen;
        self.releases_slot
            .issue(&self.fetcher, url.clone(), true, &self.events_tx);
        self.release_list_url = Some(url);
        Ok(())
    }

    /// Clear the platform and everything below it
    pub fn deselect_platform(&mut self) {
        self.releases_slot.cancel();
        self.package_slot.cancel();
        self.state = SelectionState::default();
        self.releases.clear();
        self.release_list_url = None;
        self.phase = SelectionPhase::Idle;
    }

    /// Choose the release at `index`
    ///
    /// An index past the end clears the release and returns to
    /// [`SelectionPhase::PlatformChosen`].
    pub fn choose_release(&mut self, index: usize) -> core::result::Result<(), SelectionError> {
        if self.phase == SelectionPhase::Idle {
            return Err(self.invalid("choose a release"));
        }

        self.package_slot.cancel();
        self.state.package = None;
        match self.releases.get(index) {
            Some(release) => {
                log::info!("Selected release {}", release.named_version());
                self.state.release = Some(release.clone());
                self.phase = SelectionPhase::ReleaseChosen;
            }
            None => {
                log::debug!("Release index {} out of range, clearing release", index);
                self.state.release = None;
                self.phase = SelectionPhase::PlatformChosen;
            }
        }
        Ok(())
    }

    /// Download the chosen release's package, bypassing the cache
    pub fn confirm_download(&mut self) -> Result<()> {
        if self.phase != SelectionPhase::ReleaseChosen {
            return Err(self.invalid("download a package").into());
        }
        let (Some(release), Some(base)) = (&self.state.release, &self.release_list_url) else {
            return Err(self.invalid("download a package").into());
        };
        let url = join(base, &release.url)?;

        self.last_error = None;
        log::info!("Downloading firmware {}", release.named_version());
        self.package_slot
            .issue(&self.fetcher, url, false, &self.events_tx);
        Ok(())
    }

    /// Wait for the next fetch event
    pub async fn next_event(&mut self) -> Option<SlotEvent<SelectionSlot>> {
        self.events_rx.recv().await
    }

    /// Apply a fetch event to the selection
    pub fn apply(&mut self, event: SlotEvent<SelectionSlot>) -> SelectionUpdate {
        let slot = match event.slot {
            SelectionSlot::Platforms => &mut self.platforms_slot,
            SelectionSlot::Releases => &mut self.releases_slot,
            SelectionSlot::Package => &mut self.package_slot,
        };
        if !slot.accept(event.request_id) {
            log::debug!(
                "Ignoring stale {:?} result #{}",
                event.slot,
                event.request_id
            );
            return SelectionUpdate::Stale;
        }

        let result = event.result;
        match result.status {
            FetchStatus::Aborted => {
                log::debug!("Fetch of {} was cancelled", result.source_url);
                SelectionUpdate::Cancelled
            }
            FetchStatus::Error => {
                let message = result
                    .error
                    .unwrap_or_else(|| format!("failed to download {}", result.source_url));
                log::error!("{}", message);
                self.fail(message)
            }
            FetchStatus::Ok => {
                let data = result.data.unwrap_or_default();
                match event.slot {
                    SelectionSlot::Platforms => {
                        self.platforms = catalog::parse_platforms(&data);
                        log::info!("Loaded {} platforms", self.platforms.len());
                        SelectionUpdate::PlatformsLoaded(self.platforms.len())
                    }
                    SelectionSlot::Releases => {
                        let (build_tag, name) = match &self.state.platform {
                            Some(p) => (p.build_tag.as_str(), p.name.as_str()),
                            None => ("", ""),
                        };
                        self.releases = catalog::parse_releases(&data, build_tag, name);
                        log::info!("Loaded {} releases", self.releases.len());
                        SelectionUpdate::ReleasesLoaded(self.releases.len())
                    }
                    SelectionSlot::Package => self.validate_package(&data),
                }
            }
        }
    }

    /// Wait for the next event that changes something
    pub async fn wait_update(&mut self) -> SelectionUpdate {
        loop {
            let Some(event) = self.next_event().await else {
                return SelectionUpdate::Cancelled;
            };
            match self.apply(event) {
                SelectionUpdate::Stale => continue,
                update => return update,
            }
        }
    }

    fn validate_package(&mut self, data: &[u8]) -> SelectionUpdate {
        let Some(release) = &self.state.release else {
            return SelectionUpdate::Stale;
        };
        self.phase = SelectionPhase::PackageFetched;

        let checked = verify_checksum(data, &release.sha256)
            .and_then(|()| PackageResolver::resolve(data));
        match checked {
            Ok(package) => {
                log::info!(
                    "Firmware {} ({}) is ready",
                    package.info.version,
                    package.info.git_commit
                );
                self.state.package = Some(package);
                self.phase = SelectionPhase::ValidatedReady;
                SelectionUpdate::PackageReady
            }
            Err(e) => {
                log::error!("{}", e);
                self.phase = SelectionPhase::ReleaseChosen;
                self.fail(e.to_string())
            }
        }
    }

    fn fail(&mut self, message: String) -> SelectionUpdate {
        self.last_error = Some(message.clone());
        SelectionUpdate::Failed(message)
    }

    fn invalid(&self, operation: &'static str) -> SelectionError {
        SelectionError::InvalidTransition {
            operation,
            phase: self.phase.as_str(),
        }
    }
}

fn join(base: &Url, reference: &str) -> Result<Url> {
    base.join(reference)
        .map_err(|e| Error::InvalidUrl(format!("{} relative to {}: {}", reference, base, e)))
}
