//! Comic book archive (CBZ): a zip of stored page images named so that alphabetical order is
//! reading order, optionally followed by ComicInfo.xml.

use super::{page_extension, ArtifactError, PageInfo};
use crate::model::Volume;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use zip::read::ZipArchive;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const COMIC_INFO: &str = "ComicInfo.xml";

pub(super) fn write(
    path: &Path,
    volume: &Volume,
    infos: &[PageInfo],
    comic_info: bool,
) -> Result<(), ArtifactError> {
    let file = File::create(path).map_err(|e| io_error(path, e))?;
    let mut out = write_to(BufWriter::new(file), path, volume, infos, comic_info)?;
    out.flush().map_err(|e| io_error(path, e))?;
    Ok(())
}

/// Write the archive into `out`; `path` only labels errors.
fn write_to<W: Write + Seek>(
    out: W,
    path: &Path,
    volume: &Volume,
    infos: &[PageInfo],
    comic_info: bool,
) -> Result<W, ArtifactError> {
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);

    let width = entry_width(infos.len());
    for (seq, ((_, page), info)) in volume.pages().zip(infos).enumerate() {
        let name = format!(
            "{:0width$}.{}",
            seq + 1,
            page_extension(info.format),
            width = width
        );
        zip.start_file(name, options)
            .map_err(|e| zip_error(path, e))?;
        zip.write_all(&page.bytes).map_err(|e| io_error(path, e))?;
    }

    if comic_info {
        zip.start_file(COMIC_INFO, options)
            .map_err(|e| zip_error(path, e))?;
        zip.write_all(comic_info_xml(volume, infos.len()).as_bytes())
            .map_err(|e| io_error(path, e))?;
    }

    zip.finish().map_err(|e| zip_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// I/O failures inside the zip writer keep the file path; format errors stay zip errors.
fn zip_error(path: &Path, e: ZipError) -> ArtifactError {
    match e {
        ZipError::Io(source) => io_error(path, source),
        other => ArtifactError::Zip(other),
    }
}

/// Zero-padding width for `count` entries: at least 3 digits.
fn entry_width(count: usize) -> usize {
    count.to_string().len().max(3)
}

fn comic_info_xml(volume: &Volume, page_count: usize) -> String {
    let number = volume
        .chapters
        .first()
        .map(|c| c.chapter.ordinal.to_string())
        .unwrap_or_default();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<ComicInfo xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\">\n\
  <Series>{}</Series>\n\
  <Title>{}</Title>\n\
  <Number>{}</Number>\n\
  <PageCount>{}</PageCount>\n\
</ComicInfo>\n",
        xml_escape(&volume.series),
        xml_escape(&volume.name),
        number,
        page_count
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Entry names of a zip archive in stored order.
pub fn list_archive_entries(path: &Path) -> Result<Vec<String>, ArtifactError> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut archive = ZipArchive::new(file)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_string());
    }
    Ok(names)
}
