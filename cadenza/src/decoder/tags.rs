use lofty::prelude::AudioFile;
use lofty::probe::Probe;
use std::path::Path;

/// Read the track length recorded in the file's metadata, in seconds.
///
/// This is the length the file claims to have, not a measurement of the
/// decodable audio; the two can disagree for VBR files or stale tags.
pub fn read_song_length(path: &Path) -> Option<f64> {
    let tagged_file = match Probe::open(path).and_then(|probe| probe.read()) {
        Ok(file) => file,
        Err(e) => {
            log::debug!("No readable metadata in {}: {}", path.display(), e);
            return None;
        }
    };

    let duration = tagged_file.properties().duration();
    if duration.is_zero() {
        None
    } else {
        Some(duration.as_secs_f64())
    }
}
