use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use eframe::NativeOptions;
use egui::{
    load::SizedTexture, mutex::RwLock, Button, ColorImage, ImageSource, ProgressBar, Slider,
    ViewportBuilder,
};
use log::{error, info};

use fulldome::convert::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use fulldome::params::{MAX_ANGLE, MAX_ZOOM, MIN_ZOOM};
use fulldome::video::FfmpegSource;
use fulldome::{
    default_output_path, render_preview, Config, Error, FrameSource, MediaKind,
    ProjectionParameters, Raster, Sampling, PREVIEW_MAX_SIDE,
};

use crate::export::{Export, Outcome};
use crate::render_state::RenderState;

mod export;
mod render_state;

/// Loads a still image, or the first frame of a video.
fn load_source(path: &Path, config: &Config) -> fulldome::Result<Raster> {
    match MediaKind::from_path(path)? {
        MediaKind::Image => fulldome::image_io::load_image(path),
        MediaKind::Video => {
            let mut video = FfmpegSource::open(path, &config.ffmpeg, false)?;
            video
                .next_frame()?
                .ok_or_else(|| Error::Decode(format!("{} has no frames", path.display())))
        }
    }
}

fn show_message(title: &str, description: String) {
    rfd::MessageDialog::new()
        .set_title(title)
        .set_description(description)
        .show();
}

fn show_error(description: String) {
    error!("{description}");
    show_message("Error", description);
}

/// Renders the preview on a background thread and swaps it into `out_tex`.
fn spawn_preview(
    ctx: &egui::Context,
    source: Arc<Raster>,
    params: ProjectionParameters,
    out_tex: Arc<RwLock<Option<SizedTexture>>>,
    processing: Arc<AtomicBool>,
) {
    let ctx = ctx.clone();
    processing.store(true, Ordering::Relaxed);
    thread::spawn(move || {
        match render_preview(&source, &params, PREVIEW_MAX_SIDE) {
            Ok(dome) => {
                let size = [dome.width(), dome.height()];
                let tex_manager = ctx.tex_manager();
                let id = tex_manager.write().alloc(
                    "dome".into(),
                    ColorImage::from_rgb(size, dome.as_bytes()).into(),
                    Default::default(),
                );
                let old = out_tex
                    .write()
                    .replace(SizedTexture::new(id, [size[0] as f32, size[1] as f32]));
                if let Some(old) = old {
                    tex_manager.write().free(old.id);
                }
            }
            Err(e) => error!("preview failed: {e}"),
        }
        processing.store(false, Ordering::Relaxed);
        ctx.request_repaint();
    });
}

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let mut config = Config::default();
    let mut source: Option<Arc<Raster>> = None;
    let mut input: Option<PathBuf> = None;
    let mut export: Option<Export> = None;
    let mut render_state = RenderState::default();

    let out_tex: Arc<RwLock<Option<SizedTexture>>> = Arc::new(RwLock::new(None));
    let processing = Arc::new(AtomicBool::new(false));

    let options = NativeOptions {
        viewport: ViewportBuilder::default().with_inner_size([1000., 650.]),
        ..Default::default()
    };
    eframe::run_simple_native("Fulldome Converter", options, move |ctx, _frame| {
        egui_extras::install_image_loaders(ctx);
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.vertical(|ui| {
                    let params = &mut config.projection;
                    let angles = -MAX_ANGLE..=MAX_ANGLE;

                    ui.add(Slider::new(&mut params.tilt_degrees, angles.clone()).text("Tilt"));
                    ui.add(Slider::new(&mut params.pan_degrees, angles.clone()).text("Pan"));
                    ui.add(Slider::new(&mut params.roll_degrees, angles.clone()).text("Roll"));
                    ui.add(Slider::new(&mut params.rotation_degrees, angles).text("Rotation"));
                    ui.shrink_width_to_current();
                    ui.separator();

                    ui.add(
                        Slider::new(&mut params.zoom_factor, MIN_ZOOM..=MAX_ZOOM).text("Field of View"),
                    );
                    ui.checkbox(&mut params.clamp_hemisphere, "Clamp to hemisphere");
                    ui.horizontal(|ui| {
                        ui.radio_value(&mut params.sampling, Sampling::Nearest, "Nearest");
                        ui.radio_value(&mut params.sampling, Sampling::Bilinear, "Bilinear");
                    });
                    ui.separator();

                    ui.horizontal(|ui| {
                        ui.toggle_value(&mut params.flip_horizontal, "Flip Horizontal");
                        ui.toggle_value(&mut params.flip_vertical, "Flip Vertical");
                    });
                    ui.separator();

                    ui.horizontal(|ui| {
                        let image_clicked = ui.button("Select Image").clicked();
                        let video_clicked = ui.button("Select Video").clicked();
                        let picked = if image_clicked {
                            rfd::FileDialog::new()
                                .add_filter("Image", IMAGE_EXTENSIONS)
                                .pick_file()
                        } else if video_clicked {
                            rfd::FileDialog::new()
                                .add_filter("Video", VIDEO_EXTENSIONS)
                                .pick_file()
                        } else {
                            None
                        };
                        if let Some(path) = picked {
                            match load_source(&path, &config) {
                                Ok(raster) => {
                                    info!(
                                        "loaded {} ({}x{})",
                                        path.display(),
                                        raster.width(),
                                        raster.height()
                                    );
                                    source = Some(Arc::new(raster));
                                    input = Some(path);
                                    render_state.source_replaced();
                                }
                                Err(e) => show_error(format!("Failed to open {}: {e}", path.display())),
                            }
                        }
                    });

                    ui.horizontal(|ui| {
                        if ui.button("Load Preset").clicked() {
                            let path = rfd::FileDialog::new()
                                .add_filter("Preset", &["json"])
                                .pick_file();
                            if let Some(path) = path {
                                match Config::load(&path) {
                                    Ok(loaded) => config = loaded,
                                    Err(e) => show_error(format!("Failed to load preset: {e}")),
                                }
                            }
                        }
                        if ui.button("Save Preset").clicked() {
                            let path = rfd::FileDialog::new()
                                .add_filter("Preset", &["json"])
                                .set_file_name("fulldome.json")
                                .save_file();
                            if let Some(path) = path {
                                if let Err(e) = config.save(&path) {
                                    show_error(format!("Failed to save preset: {e}"));
                                }
                            }
                        }
                    });
                    ui.separator();

                    let exporting = export.as_ref().is_some_and(Export::is_running);
                    if exporting {
                        if let Some(job) = &export {
                            ui.add(ProgressBar::new(job.progress() as f32 / 100.0).show_percentage());
                            if ui.button("Cancel").clicked() {
                                job.cancel();
                            }
                        }
                    } else if ui.add_enabled(input.is_some(), Button::new("Export")).clicked() {
                        if let Some(input) = &input {
                            if let Ok(kind) = MediaKind::from_path(input) {
                                let suggested = default_output_path(input, kind);
                                let mut dialog = rfd::FileDialog::new()
                                    .add_filter("Output", &[kind.default_extension()]);
                                if let Some(name) = suggested.file_name() {
                                    dialog = dialog.set_file_name(name.to_string_lossy());
                                }
                                if let Some(dir) = suggested.parent().filter(|d| !d.as_os_str().is_empty()) {
                                    dialog = dialog.set_directory(dir);
                                }
                                if let Some(output) = dialog.save_file() {
                                    export = Some(Export::start(ctx, input.clone(), output, config.clone()));
                                }
                            }
                        }
                    }

                    match export.as_ref().and_then(Export::take_outcome) {
                        Some(Outcome::Finished(path)) => {
                            show_message("Export", format!("Saved {}", path.display()))
                        }
                        Some(Outcome::Cancelled(path)) => show_message(
                            "Export",
                            format!("Cancelled, {} holds the frames written so far", path.display()),
                        ),
                        Some(Outcome::Failed(e)) => show_error(format!("Export failed: {e}")),
                        None => {}
                    }

                    if processing.load(Ordering::Relaxed) {
                        ui.spinner();
                    } else if let Some(source) = &source {
                        if render_state.needs_render(&config.projection) {
                            render_state.rendering(config.projection);
                            spawn_preview(
                                ctx,
                                Arc::clone(source),
                                config.projection,
                                Arc::clone(&out_tex),
                                Arc::clone(&processing),
                            );
                        }
                    }
                });

                if let Some(out_tex) = *out_tex.read() {
                    ui.image(ImageSource::Texture(out_tex));
                }
            });
        });
    })
}
