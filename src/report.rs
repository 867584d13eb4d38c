use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

pub const DEFAULT_OUTPUT_TEMPLATE: &str = "output/topics_{num_topics}.txt";

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\s*num_topics\s*\}").unwrap());

/// Whether `template` yields a different path for each topic count.
pub fn has_placeholder(template: &str) -> bool {
    PLACEHOLDER_RE.is_match(template)
}

/// Fills the `{num_topics}` placeholder of an output path template.
pub fn output_path(template: &str, num_topics: usize) -> PathBuf {
    PathBuf::from(
        PLACEHOLDER_RE
            .replace_all(template, num_topics.to_string().as_str())
            .into_owned(),
    )
}

/// Writes one `<id>\t<description>` line per topic, creating parent
/// directories as needed.
pub fn write_topics(path: &Path, topics: &[(usize, String)]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for (id, description) in topics {
        writeln!(writer, "{}\t{}", id, description)?;
    }
    writer.flush()?;

    info!("Wrote {} topics to {}", topics.len(), path.display());
    Ok(())
}

/// Human-readable listing of the topics on stdout.
pub fn print_topics(num_topics: usize, topics: &[(usize, String)]) {
    println!("\n📚 Topics (num_topics={}):", num_topics);
    for (id, description) in topics {
        println!("  {:>3}: {}", id, description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_substitutes_topic_count() {
        assert_eq!(
            output_path(DEFAULT_OUTPUT_TEMPLATE, 10),
            PathBuf::from("output/topics_10.txt")
        );
        assert_eq!(
            output_path("run/{ num_topics }/k{num_topics}.tsv", 7),
            PathBuf::from("run/7/k7.tsv")
        );
        assert_eq!(output_path("fixed.txt", 3), PathBuf::from("fixed.txt"));
        assert!(has_placeholder("k{ num_topics }.txt"));
        assert!(!has_placeholder("num_topics.txt"));
    }

    #[test]
    fn test_write_topics_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("topics_2.txt");
        let topics = vec![
            (0, "0.500*\"cat\" + 0.250*\"dog\"".to_string()),
            (1, "0.400*\"bank\"".to_string()),
        ];
        write_topics(&path, &topics).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "0\t0.500*\"cat\" + 0.250*\"dog\"\n1\t0.400*\"bank\"\n"
        );
    }
}
