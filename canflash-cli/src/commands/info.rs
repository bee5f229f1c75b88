//! Image info and configuration listing command implementations.

use {
    crate::config::Config,
    anyhow::{Context, Result},
    canflash::{
        FlashSector, HexImage, ImageSource, Microcontroller,
        bootloader::{programmed_size, sectors_for_range},
    },
    console::style,
    std::path::Path,
};

/// Sectors an update of `image` would erase on `mcu`.
fn touched_sectors(image: &HexImage, mcu: &Microcontroller) -> (u64, Vec<FlashSector>) {
    let size = programmed_size(u64::from(image.span()), mcu.min_program_unit);
    let sectors = sectors_for_range(&mcu.flash_sectors, image.min_address(), size);
    (size, sectors)
}

fn builtin_mcus() -> [Microcontroller; 2] {
    [Microcontroller::stm32f412(), Microcontroller::stm32h733()]
}

/// List configs command implementation.
pub(crate) fn cmd_list_configs(config: &Config, json: bool) -> Result<()> {
    let catalog = config.catalog()?;

    if json {
        let configs: Vec<serde_json::Value> = catalog
            .configs()
            .iter()
            .map(|c| {
                let boards: Vec<serde_json::Value> = c
                    .boards
                    .iter()
                    .map(|b| {
                        serde_json::json!({
                            "name": b.name,
                            "mcu": b.mcu.name,
                            "start_update_can_id": b.start_update_can_id,
                            "update_ack_can_id": b.update_ack_can_id,
                            "path": b.path.display().to_string(),
                        })
                    })
                    .collect();
                serde_json::json!({
                    "name": c.name,
                    "boards": boards,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "configs": configs,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style("Board configurations:").bold().underlined());
    for c in catalog.configs() {
        let names: Vec<&str> = c.boards.iter().map(|b| b.name.as_str()).collect();
        eprintln!(
            "  {} {} [{}]",
            style("•").green(),
            style(&c.name).cyan(),
            names.join(", ")
        );
    }
    Ok(())
}

/// Info command implementation.
pub(crate) fn cmd_info(hex: &Path, json: bool) -> Result<()> {
    let image = HexImage::from_file(hex)
        .with_context(|| format!("Failed to load HEX file: {}", hex.display()))?;

    if json {
        return cmd_info_json(&image);
    }

    eprintln!("{}", style("Image:").bold().underlined());
    eprintln!("  File: {}", hex.display());
    eprintln!(
        "  Range: 0x{:08X}..=0x{:08X}",
        image.min_address(),
        image.max_address()
    );
    eprintln!("  Span: {} bytes", image.span());
    match image.start_address() {
        Some(start) => eprintln!("  Start address: 0x{start:08X}"),
        None => eprintln!("  Start address: {}", style("none").dim()),
    }

    for mcu in builtin_mcus() {
        let (size, sectors) = touched_sectors(&image, &mcu);
        eprintln!(
            "\n{} ({size} bytes programmed)",
            style(&mcu.name).cyan().bold()
        );
        if sectors.is_empty() {
            eprintln!("  {}", style("outside flash").yellow());
        }
        for s in &sectors {
            eprintln!(
                "  {} sector {:2} @ 0x{:08X} ({} KiB){}",
                style("•").dim(),
                s.id,
                s.base_address,
                s.size / 1024,
                if s.write_protect {
                    format!(" {}", style("write-protected").red())
                } else {
                    String::new()
                }
            );
        }
    }

    Ok(())
}

/// Info command `--json` output: structured JSON to stdout.
fn cmd_info_json(image: &HexImage) -> Result<()> {
    let targets: Vec<serde_json::Value> = builtin_mcus()
        .iter()
        .map(|mcu| {
            let (size, sectors) = touched_sectors(image, mcu);
            let sectors: Vec<serde_json::Value> = sectors
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "id": s.id,
                        "base_address": format!("0x{:08X}", s.base_address),
                        "size": s.size,
                        "write_protect": s.write_protect,
                    })
                })
                .collect();
            serde_json::json!({
                "mcu": mcu.name,
                "size_bytes": size,
                "sectors": sectors,
            })
        })
        .collect();

    let info = serde_json::json!({
        "ok": true,
        "data": {
            "min_address": format!("0x{:08X}", image.min_address()),
            "max_address": format!("0x{:08X}", image.max_address()),
            "span": image.span(),
            "start_address": image.start_address().map(|a| format!("0x{a:08X}")),
            "targets": targets,
        }
    });

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
