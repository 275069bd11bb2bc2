// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Swagger UI download for projects that serve API docs.
//!
//! The upstream archive unpacks to `swagger-<version>/`; it is rewritten to
//! `swagger/` inside the application directory.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, info};

use crate::error::{HiveError, Result};

/// Download location of the default Swagger UI release.
pub const SWAGGER_URL: &str = "https://github.com/beego/swagger/archive/v3.zip";

const ARCHIVE_NAME: &str = "swagger.zip";

/// Whether `app_dir/swagger/index.html` exists.
pub fn swagger_present(app_dir: &Path) -> bool {
    app_dir.join("swagger").join("index.html").is_file()
}

/// Downloads and unpacks the Swagger UI into `app_dir/swagger` unless it is
/// already there. Returns whether anything was installed.
pub async fn ensure_swagger(app_dir: &Path, url: &str) -> Result<bool> {
    if swagger_present(app_dir) {
        debug!("swagger UI already present");
        return Ok(false);
    }

    let archive = app_dir.join(ARCHIVE_NAME);
    download(url, &archive).await?;
    let entries = unzip_and_delete(&archive, app_dir)?;
    info!(entries, "Swagger UI installed");
    Ok(true)
}

/// Streams `url` into `dest`. An existing non-empty file is kept as is.
pub async fn download(url: &str, dest: &Path) -> Result<u64> {
    if let Ok(meta) = fs::metadata(dest) {
        if meta.len() > 0 {
            info!("'{}' already exists", dest.display());
            return Ok(meta.len());
        }
    }

    info!("Downloading '{}' to '{}'...", url, dest.display());
    let failed = |message: String| HiveError::Download {
        url: url.to_string(),
        message,
    };

    let resp = Client::new()
        .get(url)
        .header("User-Agent", "hive")
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP error: {}", status)));
    }

    let mut file = File::create(dest)?;
    let mut stream = resp.bytes_stream();
    let mut downloaded = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| failed(e.to_string()))?;
        downloaded += chunk.len() as u64;
        file.write_all(&chunk)?;
    }

    info!("{} bytes downloaded!", downloaded);
    Ok(downloaded)
}

/// Unpacks `archive` into `dest_dir`, renaming a leading `swagger-*`
/// directory to `swagger`, then deletes the archive. Returns the number of
/// entries written.
pub fn unzip_and_delete(archive: &Path, dest_dir: &Path) -> Result<usize> {
    info!("Unzipping '{}'...", archive.display());
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let mut written = 0;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let outpath = dest_dir.join(rewrite_top_dir(&relative));

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut entry, &mut outfile)?;
        }
        written += 1;
    }

    fs::remove_file(archive)?;
    Ok(written)
}

fn rewrite_top_dir(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first.to_string_lossy().starts_with("swagger-") => {
            Path::new("swagger").join(components.as_path())
        }
        _ => path.to_path_buf(),
    }
}
