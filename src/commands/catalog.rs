//! Catalog commands: platforms, releases, install

use super::flash::{flash_job, print_package_info};
use super::CmdResult;
use crate::cli::FlashArgs;
use fnflasher_core::fetch::ArtifactFetcher;
use fnflasher_core::selection::{SelectionController, SelectionUpdate};
use url::Url;

/// Load the platform catalog
pub async fn open_catalog(
    fetcher: ArtifactFetcher,
    catalog_url: &str,
) -> CmdResult<SelectionController> {
    let url = Url::parse(catalog_url)
        .map_err(|_| fnflasher_core::Error::InvalidUrl(catalog_url.to_string()))?;
    let mut controller = SelectionController::new(fetcher, url);
    controller.load_platforms();
    expect(&mut controller, |u| {
        matches!(u, SelectionUpdate::PlatformsLoaded(_))
    })
    .await?;
    Ok(controller)
}

/// Choose a platform by name and load its releases
pub async fn choose_platform(controller: &mut SelectionController, name: &str) -> CmdResult {
    let Some(index) = controller
        .platforms()
        .iter()
        .position(|p| p.name.eq_ignore_ascii_case(name))
    else {
        let known: Vec<_> = controller.platforms().iter().map(|p| p.name.as_str()).collect();
        return Err(format!("Unknown platform {} (available: {})", name, known.join(", ")).into());
    };

    controller.choose_platform(index)?;
    expect(controller, |u| matches!(u, SelectionUpdate::ReleasesLoaded(_))).await
}

/// Wait until `done` accepts an update; a failure ends the wait with its message
async fn expect(
    controller: &mut SelectionController,
    done: impl Fn(&SelectionUpdate) -> bool,
) -> CmdResult {
    loop {
        match controller.wait_update().await {
            SelectionUpdate::Failed(message) => return Err(message.into()),
            SelectionUpdate::Cancelled => return Err("Download cancelled".into()),
            update if done(&update) => return Ok(()),
            update => log::debug!("Ignoring {:?}", update),
        }
    }
}

/// List platforms in the catalog
pub async fn cmd_platforms(fetcher: ArtifactFetcher, catalog_url: &str) -> CmdResult {
    let controller = open_catalog(fetcher, catalog_url).await?;

    println!("{:<24} {:<12} Description", "Platform", "Build");
    println!("{}", "-".repeat(72));
    for platform in controller.platforms() {
        println!(
            "{:<24} {:<12} {}",
            platform.name, platform.build_tag, platform.description
        );
    }
    Ok(())
}

/// List releases of one platform
pub async fn cmd_releases(fetcher: ArtifactFetcher, catalog_url: &str, platform: &str) -> CmdResult {
    let mut controller = open_catalog(fetcher, catalog_url).await?;
    choose_platform(&mut controller, platform).await?;

    if controller.releases().is_empty() {
        println!("No releases for {}", platform);
    }
    for release in controller.releases() {
        println!("{}", release.info_text());
    }
    Ok(())
}

/// Download a release, verify it and flash it
pub async fn cmd_install(
    fetcher: ArtifactFetcher,
    catalog_url: &str,
    device: &FlashArgs,
    platform: &str,
    version: &str,
) -> CmdResult {
    let mut controller = open_catalog(fetcher, catalog_url).await?;
    choose_platform(&mut controller, platform).await?;

    let Some(index) = controller
        .releases()
        .iter()
        .position(|r| r.version == version)
    else {
        return Err(format!("{} has no release {}", platform, version).into());
    };
    controller.choose_release(index)?;
    controller.confirm_download()?;
    expect(&mut controller, |u| *u == SelectionUpdate::PackageReady).await?;

    let package = controller
        .package()
        .ok_or("Package download finished without a package")?;
    print_package_info(package);
    flash_job(device, package.job.clone()).await
}
