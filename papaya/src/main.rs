#![warn(clippy::pedantic)]

pub mod settings;

use papaya_core::pixels::PixelBuffer;
use papaya_core::state::{
    graph::{NodeID, NodeKind, SlotRef},
    Document,
};

use anyhow::Result as AnyResult;

/// Where the result for `input` is written: next to it, with the suffix on its stem, as a PNG.
fn output_path(input: &std::path::Path, suffix: &str) -> std::path::PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push(suffix);
    name.push(".png");
    input.with_file_name(name)
}

/// Build the document for one image: the image as a bitmap node, optionally through an inversion.
/// Returns the document and the node to render.
fn build_document(
    name: String,
    source: PixelBuffer,
    settings: &settings::Settings,
) -> AnyResult<(Document, NodeID)> {
    let mut document = Document::new();
    document.name = name;
    document.viewport.canvas_size = source.size();
    document.viewport.set_zoom(settings.zoom);

    let bitmap = document.create_node(NodeKind::bitmap(source), "Base image", [108.0, 158.0]);
    let output = if settings.invert {
        let invert =
            document.create_node(NodeKind::InvertColor, "Color inversion", [108.0, 108.0]);
        document.connect(SlotRef::new(bitmap, 0), SlotRef::new(invert, 0))?;
        invert
    } else {
        bitmap
    };
    Ok((document, output))
}

/// Level handed to whichever logger is installed. Unreadable levels fall back to debug.
fn log_filter(settings: &settings::Settings) -> log::LevelFilter {
    settings
        .level_filter()
        .unwrap_or(log::LevelFilter::Debug)
}

fn process(path: &std::path::Path, settings: &settings::Settings) -> AnyResult<std::path::PathBuf> {
    let image = image::open(path)?.into_rgba8();
    let (width, height) = image.dimensions();
    let source = PixelBuffer::from_rgba8_bytes(width, height, image.as_raw())?;
    let name = path
        .file_name()
        .map_or_else(|| "New Document".to_owned(), |name| name.to_string_lossy().into_owned());

    let (document, output) = build_document(name, source, settings)?;
    let result = document.evaluate_viewport(output)?;
    log::info!(
        "{}: rendered {}x{} from {} nodes",
        document.name,
        result.width(),
        result.height(),
        document.graph().len()
    );

    let out_path = output_path(path, &settings.output_suffix);
    let encoded = image::RgbaImage::from_raw(result.width(), result.height(), result.as_bytes().to_vec())
        .ok_or_else(|| anyhow::anyhow!("rendered buffer doesn't match its size"))?;
    encoded.save(&out_path)?;
    Ok(out_path)
}

fn main() -> AnyResult<()> {
    // Settings decide the log level, so they're loaded before any logger exists.
    // Anything logged while loading them is lost.
    let settings = settings::Settings::get();
    let filter = log_filter(settings);

    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder().filter_level(filter).init();
    } else {
        let _ = simple_logging::log_to_file("log.out", filter);
    }
    if let Err(e) = settings.level_filter() {
        log::warn!("{e}");
    }
    if settings.did_fail_to_load() {
        log::info!("using default settings");
    }

    // Args are a list of images to process, or the flag to write out default settings.
    // Paths are OSStrings, let the system handle character encoding restrictions.
    let mut write_settings = false;
    let paths: Vec<std::path::PathBuf> = std::env::args_os()
        .skip(1)
        .filter(|arg| {
            let is_flag = arg == "--write-settings";
            write_settings |= is_flag;
            !is_flag
        })
        .map(Into::into)
        .collect();

    if write_settings {
        let saved = settings.save()?;
        log::info!("Wrote settings to {saved:?}");
    }

    let processing_succeeded = {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
        // Did we have at least one success? No paths is a success.
        let had_success: std::sync::atomic::AtomicBool = paths.is_empty().into();
        paths.into_par_iter().for_each(|path| match process(&path, settings) {
            Err(e) => {
                log::error!("failed to process file {path:?}: {e:#}");
            }
            Ok(out) => {
                // We don't care when it's stored, so long as it gets there eventually.
                had_success.store(true, std::sync::atomic::Ordering::Relaxed);
                log::info!("wrote {out:?}");
            }
        });

        had_success.into_inner()
    };
    if !processing_succeeded {
        anyhow::bail!("Failed to process any provided image.");
    }
    Ok(())
}
