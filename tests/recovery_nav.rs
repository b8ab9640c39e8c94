use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use sdds::{
    error_kind, ArrayData, ArrayDefinition, ByteOrder, ColumnDefinition, Dataset, DatasetState, Encoding,
    ErrorHistory, ErrorKind, ParameterDefinition, PrimitiveType, SddsConfig,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("sddstest-recovery-{prefix}-{pid}-{t}-{id}"))
}

/// `pages` pages of `rows` Float64 rows; page p holds p*100 + r.
fn write_pages(path: &Path, encoding: Encoding, pages: usize, rows: usize) -> Result<()> {
    let mut ds = Dataset::create_with(path, encoding, SddsConfig::default())?;
    let layout = ds.layout_mut()?;
    layout.data_mode.byte_order = Some(ByteOrder::Little);
    layout.define_column(ColumnDefinition::new("v", PrimitiveType::Float64))?;
    ds.write_layout()?;
    for p in 1..=pages {
        ds.start_page(rows)?;
        let vals: Vec<f64> = (0..rows).map(|r| (p * 100 + r) as f64).collect();
        ds.set_column("v", vals.into())?;
        ds.write_page()?;
    }
    ds.terminate()
}

fn values(ds: &Dataset) -> Vec<f64> {
    ds.column("v")
        .and_then(|c| c.as_slice::<f64>())
        .unwrap_or_default()
        .to_vec()
}

fn truncate_by(path: &Path, bytes: u64) -> Result<()> {
    let len = fs::metadata(path)?.len();
    OpenOptions::new().write(true).open(path)?.set_len(len - bytes)?;
    Ok(())
}

fn patch(path: &Path, offset: u64, bytes: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new().write(true).open(path)?;
    f.seek(SeekFrom::Start(offset))?;
    f.write_all(bytes)?;
    Ok(())
}

/// Little-endian page: count, `tag` ("ok"), array `a` ([1, 2, 3]), one row.
/// Returns the page offset.
fn write_headed(path: &Path) -> Result<u64> {
    let mut ds = Dataset::create_with(path, Encoding::Binary, SddsConfig::default())?;
    let layout = ds.layout_mut()?;
    layout.data_mode.byte_order = Some(ByteOrder::Little);
    layout.define_parameter(ParameterDefinition::new("tag", PrimitiveType::String))?;
    layout.define_array(ArrayDefinition::new("a", PrimitiveType::Float64, 1))?;
    layout.define_column(ColumnDefinition::new("v", PrimitiveType::Float64))?;
    ds.write_layout()?;
    ds.start_page(1)?;
    ds.set_parameter("tag", "ok")?;
    ds.set_array("a", ArrayData::from_values(vec![3], vec![1.0, 2.0, 3.0].into())?)?;
    ds.set_column("v", vec![1.0].into())?;
    ds.write_page()?;
    let off = ds.page_offsets()[0];
    ds.terminate()?;
    Ok(off)
}

fn auto() -> SddsConfig {
    SddsConfig::default().with_auto_recover(true)
}

#[test]
fn truncated_binary_page_with_auto_recovery() -> Result<()> {
    init_logging();
    let root = unique_root("auto");
    fs::create_dir_all(&root)?;
    let path = root.join("t.sdds");
    write_pages(&path, Encoding::Binary, 1, 5)?;
    // keep 2 whole rows and half of the third
    truncate_by(&path, 20)?;

    let before = sdds::metrics_snapshot().auto_recoveries;
    let mut ds = Dataset::open_read_with(&path, SddsConfig::default().with_auto_recover(true))?;
    assert_eq!(ds.read_page()?, Some(1));
    assert_eq!(ds.row_count(), 2);
    assert_eq!(values(&ds), vec![100.0, 101.0]);
    assert!(ds.recovered());
    assert_eq!(ds.read_page()?, None);
    assert!(sdds::metrics_snapshot().auto_recoveries > before);
    Ok(())
}

#[test]
fn truncated_binary_page_without_auto_recovery() -> Result<()> {
    let root = unique_root("fatal");
    fs::create_dir_all(&root)?;
    let path = root.join("t.sdds");
    write_pages(&path, Encoding::Binary, 1, 5)?;
    truncate_by(&path, 20)?;

    let history = ErrorHistory::new();
    let cfg = SddsConfig::default().with_error_history(Some(history.clone()));
    let mut ds = Dataset::open_read_with(&path, cfg)?;
    let err = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Truncation);
    assert!(ds.needs_recovery());
    assert!(!ds.recovered());
    assert_eq!(ds.row_count(), 2);
    assert_eq!(history.len(), 1);
    assert!(history.messages()[0].contains("truncated"));

    let again = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&again), ErrorKind::Usage);
    assert_eq!(history.len(), 2);
    history.clear();
    assert!(history.is_empty());
    Ok(())
}

#[test]
fn truncated_ascii_page() -> Result<()> {
    init_logging();
    let root = unique_root("ascii");
    fs::create_dir_all(&root)?;
    let path = root.join("t.sdds");
    write_pages(&path, Encoding::Ascii, 1, 5)?;
    let text = fs::read_to_string(&path)?;
    // drop the last three row lines
    let mut lines: Vec<&str> = text.lines().collect();
    lines.truncate(lines.len() - 3);
    fs::write(&path, format!("{}\n", lines.join("\n")))?;

    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    let err = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Truncation);

    let mut ds = Dataset::open_read_with(&path, SddsConfig::default().with_auto_recover(true))?;
    assert_eq!(ds.read_page()?, Some(1));
    assert_eq!(values(&ds), vec![100.0, 101.0]);
    assert_eq!(ds.read_page()?, None);
    Ok(())
}

#[test]
fn goto_page_after_reading_five_pages() -> Result<()> {
    let root = unique_root("goto");
    fs::create_dir_all(&root)?;
    for encoding in [Encoding::Binary, Encoding::Ascii] {
        let path = root.join(format!("g.{}", encoding.name()));
        write_pages(&path, encoding, 5, 3)?;

        let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
        let mut third = Vec::new();
        for n in 1..=5 {
            assert_eq!(ds.read_page()?, Some(n));
            if n == 3 {
                third = values(&ds);
            }
        }
        assert_eq!(ds.read_page()?, None);

        ds.goto_page(3)?;
        assert_eq!(ds.state(), DatasetState::LayoutReady);
        assert_eq!(ds.read_page()?, Some(3));
        assert_eq!(values(&ds), third);
        assert_eq!(third, vec![300.0, 301.0, 302.0]);
        assert_eq!(ds.read_page()?, Some(4));
    }
    Ok(())
}

#[test]
fn goto_unvisited_page_reads_forward() -> Result<()> {
    let root = unique_root("forward");
    fs::create_dir_all(&root)?;
    let path = root.join("f.sdds");
    write_pages(&path, Encoding::Binary, 5, 2)?;

    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    ds.goto_page(4)?;
    assert_eq!(ds.read_page()?, Some(4));
    assert_eq!(values(&ds), vec![400.0, 401.0]);

    let err = ds.goto_page(9).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Usage);
    ds.goto_page(1)?;
    assert_eq!(ds.read_page()?, Some(1));
    Ok(())
}

#[test]
fn reader_disconnect_and_reconnect() -> Result<()> {
    let root = unique_root("detach-r");
    fs::create_dir_all(&root)?;
    let path = root.join("r.sdds");
    write_pages(&path, Encoding::Ascii, 3, 2)?;

    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    assert_eq!(ds.read_page()?, Some(1));
    ds.disconnect()?;
    assert_eq!(ds.state(), DatasetState::Disconnected);
    assert!(ds.read_page().is_err());
    ds.reconnect()?;
    assert_eq!(ds.state(), DatasetState::PageActive);
    assert_eq!(ds.read_page()?, Some(2));
    assert_eq!(values(&ds), vec![200.0, 201.0]);
    Ok(())
}

#[test]
fn writer_disconnect_releases_lock() -> Result<()> {
    let root = unique_root("detach-w");
    fs::create_dir_all(&root)?;
    let path = root.join("w.sdds");

    let mut ds = Dataset::create_with(&path, Encoding::Binary, SddsConfig::default())?;
    ds.layout_mut()?
        .define_column(ColumnDefinition::new("v", PrimitiveType::Float64))?;
    ds.write_layout()?;
    ds.start_page(1)?;
    ds.set_column("v", vec![1.0].into())?;
    ds.write_page()?;
    ds.flush()?;

    // a second writer is refused while the first holds the file
    let err = Dataset::open_append_with(&path, SddsConfig::default()).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Lock);

    ds.disconnect()?;
    {
        let other = Dataset::open_append_with(&path, SddsConfig::default())?;
        assert_eq!(other.page_number(), 1);
        // dropped without writing
    }
    ds.reconnect()?;
    ds.start_page(1)?;
    ds.set_column("v", vec![2.0].into())?;
    ds.write_page()?;
    ds.terminate()?;

    let mut r = Dataset::open_read_with(&path, SddsConfig::default())?;
    assert_eq!(r.read_page()?, Some(1));
    assert_eq!(r.read_page()?, Some(2));
    assert_eq!(values(&r), vec![2.0]);
    Ok(())
}

#[test]
fn wrong_state_calls_are_usage_errors() -> Result<()> {
    let root = unique_root("states");
    fs::create_dir_all(&root)?;
    let path = root.join("s.sdds");
    write_pages(&path, Encoding::Binary, 1, 1)?;

    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    assert_eq!(error_kind(&ds.start_page(1).unwrap_err()), ErrorKind::Usage);
    assert_eq!(error_kind(&ds.layout_mut().unwrap_err()), ErrorKind::Usage);

    let mut w = Dataset::create_with(root.join("w.sdds"), Encoding::Ascii, SddsConfig::default())?;
    assert_eq!(error_kind(&w.start_page(1).unwrap_err()), ErrorKind::Usage);
    assert_eq!(error_kind(&w.read_page().unwrap_err()), ErrorKind::Usage);
    Ok(())
}

#[test]
fn bad_parameter_is_fatal_even_with_auto_recovery() -> Result<()> {
    init_logging();
    let root = unique_root("param");
    fs::create_dir_all(&root)?;
    let path = root.join("p.sdds");
    fs::write(
        &path,
        "SDDS1\n\
         &parameter name=step, type=long, &end\n\
         &column name=v, type=double, &end\n\
         &data mode=ascii, &end\n\
         ! page number 1\n\
         notanumber\n\
         1\n\
         1.5\n",
    )?;
    let mut ds = Dataset::open_read_with(&path, auto())?;
    let err = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Format);
    assert!(!ds.recovered());

    // stream ends inside the parameter block
    let path = root.join("p.bin");
    let off = write_headed(&path)?;
    let len = fs::metadata(&path)?.len();
    OpenOptions::new().write(true).open(&path)?.set_len(off + 4 + 3)?;
    assert!(len > off + 7);
    let mut ds = Dataset::open_read_with(&path, auto())?;
    let err = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Truncation);
    assert!(!ds.recovered());
    Ok(())
}

#[test]
fn row_spread_over_wrong_line_count_is_a_layout_error() -> Result<()> {
    let root = unique_root("lines");
    fs::create_dir_all(&root)?;
    let header = "SDDS1\n\
                  &column name=a, type=long, &end\n\
                  &column name=b, type=long, &end\n\
                  &data mode=ascii, lines_per_row=2, &end\n\
                  ! page number 1\n\
                  1\n";
    let good = root.join("good.sdds");
    fs::write(&good, format!("{header}1\n2\n"))?;
    let mut ds = Dataset::open_read_with(&good, SddsConfig::default())?;
    assert_eq!(ds.read_page()?, Some(1));
    assert_eq!(ds.column("a").and_then(|c| c.as_slice::<i32>()), Some(&[1][..]));
    assert_eq!(ds.column("b").and_then(|c| c.as_slice::<i32>()), Some(&[2][..]));

    // both values on the first line
    let bad = root.join("bad.sdds");
    fs::write(&bad, format!("{header}1 2\n3 4\n"))?;
    let mut ds = Dataset::open_read_with(&bad, SddsConfig::default())?;
    let err = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Format);
    assert!(format!("{err:#}").contains("line layout"), "{err:#}");

    let mut ds = Dataset::open_read_with(&bad, auto())?;
    assert_eq!(ds.read_page()?, Some(1));
    assert!(ds.recovered());
    assert_eq!(ds.row_count(), 0);
    Ok(())
}

#[test]
fn corrupt_lengths_fail_as_truncation() -> Result<()> {
    let root = unique_root("lengths");
    fs::create_dir_all(&root)?;

    // array dimension
    let path = root.join("dim.sdds");
    let off = write_headed(&path)?;
    patch(&path, off + 4 + 4 + 2, &i32::MAX.to_le_bytes())?;
    let mut ds = Dataset::open_read_with(&path, auto())?;
    let err = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Truncation);

    // string length
    let path = root.join("str.sdds");
    let off = write_headed(&path)?;
    patch(&path, off + 4, &i32::MAX.to_le_bytes())?;
    let mut ds = Dataset::open_read_with(&path, auto())?;
    let err = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Truncation);
    Ok(())
}

#[test]
fn non_utf8_strings_are_format_errors() -> Result<()> {
    let root = unique_root("utf8");
    fs::create_dir_all(&root)?;

    let path = root.join("latin1.sdds");
    let off = write_headed(&path)?;
    // "ok" -> "o\xe9"
    patch(&path, off + 4 + 4, &[b'o', 0xe9])?;
    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    let err = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Format);

    // octal escape of a lone Latin-1 byte in a text page
    let path = root.join("latin1.txt.sdds");
    fs::write(
        &path,
        "SDDS1\n\
         &parameter name=tag, type=string, &end\n\
         &data mode=ascii, no_row_counts=1, &end\n\
         ! page number 1\n\
         caf\\351\n",
    )?;
    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    let err = ds.read_page().unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Format);
    Ok(())
}
