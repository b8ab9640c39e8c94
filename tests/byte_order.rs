use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use sdds::{ByteOrder, ColumnDefinition, Dataset, Encoding, PrimitiveType, SddsConfig, Value};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("sddstest-order-{prefix}-{pid}-{t}-{id}"))
}

/// One page, one row, `x = 1` of type `ty`; no byte order declared.
/// Returns the page offset.
fn write_one(path: &Path, ty: PrimitiveType, cfg: SddsConfig) -> Result<u64> {
    let mut ds = Dataset::create_with(path, Encoding::Binary, cfg)?;
    ds.layout_mut()?.define_column(ColumnDefinition::new("x", ty))?;
    ds.write_layout()?;
    ds.start_page(1)?;
    let one = match ty {
        PrimitiveType::Int64 => Value::Int64(1),
        _ => Value::Int32(1),
    };
    ds.set_row_values(0, &[one])?;
    ds.write_page()?;
    let off = ds.page_offsets()[0];
    ds.terminate()?;
    Ok(off)
}

fn header_text(path: &Path, off: u64) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes[..off as usize]).into_owned())
}

#[test]
fn configured_big_order_reaches_header_and_page() -> Result<()> {
    let root = unique_root("cfg");
    fs::create_dir_all(&root)?;
    let cfg = SddsConfig::default().with_output_byte_order(Some(ByteOrder::Big));

    // 64-bit column: version 4, order lives in &data
    let path = root.join("v4.sdds");
    let off = write_one(&path, PrimitiveType::Int64, cfg.clone())? as usize;
    let header = header_text(&path, off as u64)?;
    assert!(header.starts_with("SDDS4\n"), "{header}");
    assert!(header.contains("endian=big"), "{header}");
    let bytes = fs::read(&path)?;
    assert_eq!(&bytes[off..off + 4], &[0, 0, 0, 1]);
    assert_eq!(&bytes[off + 4..off + 12], &[0, 0, 0, 0, 0, 0, 0, 1]);

    // 32-bit column: version 1, order carried by the flag comment
    let path = root.join("v1.sdds");
    let off = write_one(&path, PrimitiveType::Int32, cfg)? as usize;
    let header = header_text(&path, off as u64)?;
    assert!(header.starts_with("SDDS1\n"), "{header}");
    assert!(header.contains("!# big-endian"), "{header}");
    assert!(!header.contains("endian="), "{header}");
    let bytes = fs::read(&path)?;
    assert_eq!(&bytes[off..off + 8], &[0, 0, 0, 1, 0, 0, 0, 1]);

    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    assert_eq!(ds.layout().data_mode.byte_order, Some(ByteOrder::Big));
    ds.read_page()?;
    assert_eq!(ds.column("x").and_then(|c| c.as_slice::<i32>()), Some(&[1][..]));
    Ok(())
}

#[test]
fn environment_selects_output_order() -> Result<()> {
    let root = unique_root("env");
    fs::create_dir_all(&root)?;
    let native_other = match ByteOrder::native() {
        ByteOrder::Big => ByteOrder::Little,
        ByteOrder::Little => ByteOrder::Big,
    };
    std::env::set_var("SDDS_OUTPUT_ENDIANESS", native_other.name());
    let cfg = SddsConfig::from_env().with_lock_on_write(false);
    std::env::remove_var("SDDS_OUTPUT_ENDIANESS");
    assert_eq!(cfg.output_byte_order, Some(native_other));

    let path = root.join("env.sdds");
    let off = write_one(&path, PrimitiveType::Int64, cfg)? as usize;
    let header = header_text(&path, off as u64)?;
    assert!(header.contains(&format!("endian={}", native_other.name())), "{header}");
    let bytes = fs::read(&path)?;
    let want: [u8; 4] = match native_other {
        ByteOrder::Big => 1i32.to_be_bytes(),
        ByteOrder::Little => 1i32.to_le_bytes(),
    };
    assert_eq!(&bytes[off..off + 4], &want);

    // the declared order wins over the configured one
    let mut ds = Dataset::create_with(root.join("declared.sdds"), Encoding::Binary, SddsConfig::default()
        .with_output_byte_order(Some(native_other)))?;
    let layout = ds.layout_mut()?;
    layout.data_mode.byte_order = Some(ByteOrder::native());
    layout.define_column(ColumnDefinition::new("x", PrimitiveType::Int64))?;
    ds.write_layout()?;
    assert_eq!(ds.layout().data_mode.byte_order, Some(ByteOrder::native()));
    ds.terminate()?;
    Ok(())
}
