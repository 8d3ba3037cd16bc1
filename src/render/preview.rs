// SPDX-License-Identifier: GPL-3.0-only

//! Offscreen preview renderer for the nine-tile filter grid.
//!
//! Draws the latest camera frame into a private render target, either as a
//! single full-surface image or as a 3x3 grid where every tile runs a
//! different lookup filter. Grid rows grow upward from the bottom-left
//! corner so tile order matches [`TouchSelector`] hit testing.
//!
//! Camera and LUT textures persist across frames and are only recreated
//! when their dimensions or contents actually change.
//!
//! [`TouchSelector`]: crate::render::selection::TouchSelector

use std::sync::Arc;

use tracing::{debug, info};

use crate::backends::camera::types::{CameraFrame, Dimension};
use crate::constants::filters::{GRID_DIM, TILE_COUNT};
use crate::render::luts::FilterSet;
use crate::render::selection::SelectionState;

const PREVIEW_SHADER: &str = include_str!("preview.wgsl");

/// Dynamic uniform offsets must be 256-byte aligned.
const UNIFORM_STRIDE: u32 = 256;
/// Nine grid slots plus one slot for the full-surface draw.
const UNIFORM_SLOTS: u32 = TILE_COUNT as u32 + 1;
const FULL_DRAW_SLOT: u32 = TILE_COUNT as u32;

/// Per-draw uniform block, mirrored by `TileParams` in preview.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct TileParams {
    /// Clockwise quarter turns (0..3)
    rotation: u32,
    /// Slice index into the LUT strip, -1 passes color through
    filter_slot: i32,
    /// Non-zero collapses to Rec.709 luma before the lookup
    grayscale: u32,
    /// Slices stitched into the strip
    slice_count: u32,
}

struct FrameTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct LutTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// Set the strip was uploaded from, compared by pointer on each frame
    filters: Arc<FilterSet>,
}

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Headless renderer owning its own wgpu device.
pub struct PreviewRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    /// 1x1 stand-in bound while no filter set is loaded. Those draws pass
    /// filter_slot -1, so it is never sampled.
    placeholder_lut: wgpu::TextureView,
    camera: Option<FrameTexture>,
    lut: Option<LutTexture>,
    target: Option<RenderTarget>,
    bind_group: Option<wgpu::BindGroup>,
    surface: Dimension,
    frames_rendered: u64,
}

impl PreviewRenderer {
    /// Create a renderer targeting an offscreen surface of `surface` pixels.
    ///
    /// Fails with a descriptive message when no GPU adapter is available,
    /// which callers treat as "preview unsupported on this machine".
    pub fn new(surface: Dimension) -> Result<Self, String> {
        if surface.width == 0 || surface.height == 0 {
            return Err(format!("preview surface {surface} is empty"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| format!("no suitable GPU adapter: {e}"))?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "GPU adapter selected for preview"
        );

        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
                label: Some("lutcam preview device"),
                required_features: wgpu::Features::empty(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            }))
            .map_err(|e| format!("failed to create GPU device: {e}"))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lutcam preview shader"),
            source: wgpu::ShaderSource::Wgsl(PREVIEW_SHADER.into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("lutcam preview bind group layout"),
                entries: &[
                    // Camera frame
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    // LUT strip
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    // Sampler
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    // Tile params, one 256-byte slot per draw
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: wgpu::BufferSize::new(
                                std::mem::size_of::<TileParams>() as u64,
                            ),
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lutcam preview pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("lutcam preview pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lutcam preview sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lutcam tile params"),
            size: (UNIFORM_SLOTS * UNIFORM_STRIDE) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let placeholder_lut = create_placeholder_lut(&device, &queue);

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            placeholder_lut,
            camera: None,
            lut: None,
            target: None,
            bind_group: None,
            surface,
            frames_rendered: 0,
        })
    }

    pub fn surface_size(&self) -> Dimension {
        self.surface
    }

    /// Resize the render target. The target itself is recreated lazily on
    /// the next `render` call.
    pub fn set_surface_size(&mut self, surface: Dimension) {
        if surface.width == 0 || surface.height == 0 {
            debug!(%surface, "ignoring empty preview surface");
            return;
        }
        self.surface = surface;
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Draw one camera frame into the render target.
    ///
    /// With the grid visible and a filter set loaded this issues nine tile
    /// draws, one per grid slot; tiles past the filter count render the
    /// frame unfiltered. Otherwise a single full-surface draw runs the
    /// committed filter, or none.
    pub fn render(
        &mut self,
        frame: &CameraFrame,
        selection: &SelectionState,
        rotation_degrees: u32,
    ) -> Result<(), String> {
        if frame.width == 0 || frame.height == 0 {
            return Err("camera frame has no pixels".to_string());
        }

        self.ensure_target();
        self.upload_frame(frame);
        let filters = selection.filters();
        self.ensure_lut(filters.as_ref());
        self.ensure_bind_group();

        let Some(bind_group) = self.bind_group.as_ref() else {
            return Err("preview bind group missing".to_string());
        };
        let Some(target) = self.target.as_ref() else {
            return Err("preview render target missing".to_string());
        };

        let turns = (rotation_degrees / 90) % 4;
        let slice_count = filters.as_ref().map(|set| set.len()).unwrap_or(0);
        let grid = selection.grid_visible() && slice_count > 0;

        let block = encode_tile_params(filters.as_deref(), selection, turns, grid);
        self.queue.write_buffer(&self.uniform_buffer, 0, &block);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lutcam preview encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lutcam preview pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);

            if grid {
                for slot in 0..TILE_COUNT {
                    let (x, y, w, h) = tile_rect(self.surface, slot);
                    if w == 0 || h == 0 {
                        continue;
                    }
                    pass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
                    pass.set_scissor_rect(x, y, w, h);
                    pass.set_bind_group(0, bind_group, &[slot as u32 * UNIFORM_STRIDE]);
                    pass.draw(0..6, 0..1);
                }
            } else {
                pass.set_viewport(
                    0.0,
                    0.0,
                    target.width as f32,
                    target.height as f32,
                    0.0,
                    1.0,
                );
                pass.set_scissor_rect(0, 0, target.width, target.height);
                pass.set_bind_group(0, bind_group, &[FULL_DRAW_SLOT * UNIFORM_STRIDE]);
                pass.draw(0..6, 0..1);
            }
        }

        self.queue.submit(Some(encoder.finish()));
        self.frames_rendered += 1;
        Ok(())
    }

    /// Read the render target back as tightly packed RGBA rows.
    pub fn read_rgba(&self) -> Result<Vec<u8>, String> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| "nothing rendered yet".to_string())?;

        let bytes_per_row = target.width * 4;
        let padded_bytes_per_row =
            bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
                * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lutcam preview readback"),
            size: (padded_bytes_per_row * target.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lutcam readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let padded = pollster::block_on(read_buffer(&self.device, &buffer))?;

        let mut pixels = Vec::with_capacity((bytes_per_row * target.height) as usize);
        for row in padded.chunks_exact(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..bytes_per_row as usize]);
        }
        Ok(pixels)
    }

    fn ensure_target(&mut self) {
        let stale = self
            .target
            .as_ref()
            .map(|t| t.width != self.surface.width || t.height != self.surface.height)
            .unwrap_or(true);
        if !stale {
            return;
        }

        debug!(surface = %self.surface, "creating preview render target");
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lutcam preview target"),
            size: wgpu::Extent3d {
                width: self.surface.width,
                height: self.surface.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.target = Some(RenderTarget {
            texture,
            view,
            width: self.surface.width,
            height: self.surface.height,
        });
    }

    fn upload_frame(&mut self, frame: &CameraFrame) {
        let stale = self
            .camera
            .as_ref()
            .map(|t| t.width != frame.width || t.height != frame.height)
            .unwrap_or(true);
        if stale {
            debug!(
                width = frame.width,
                height = frame.height,
                "creating camera texture"
            );
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("lutcam camera texture"),
                size: wgpu::Extent3d {
                    width: frame.width,
                    height: frame.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.camera = Some(FrameTexture {
                texture,
                view,
                width: frame.width,
                height: frame.height,
            });
            self.bind_group = None;
        }

        if let Some(camera) = self.camera.as_ref() {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &camera.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &frame.data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(frame.stride),
                    rows_per_image: None,
                },
                wgpu::Extent3d {
                    width: frame.width,
                    height: frame.height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn ensure_lut(&mut self, filters: Option<&Arc<FilterSet>>) {
        let stale = match (&self.lut, filters) {
            (Some(current), Some(next)) => !Arc::ptr_eq(&current.filters, next),
            (None, None) => false,
            _ => true,
        };
        if !stale {
            return;
        }

        self.lut = filters.map(|set| {
            let strip = set.strip();
            debug!(
                slices = set.len(),
                width = strip.width(),
                height = strip.height(),
                "uploading LUT strip"
            );
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("lutcam lut strip"),
                size: wgpu::Extent3d {
                    width: strip.width(),
                    height: strip.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                strip.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(strip.width() * 4),
                    rows_per_image: None,
                },
                wgpu::Extent3d {
                    width: strip.width(),
                    height: strip.height(),
                    depth_or_array_layers: 1,
                },
            );
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            LutTexture {
                _texture: texture,
                view,
                filters: Arc::clone(set),
            }
        });
        self.bind_group = None;
    }

    fn ensure_bind_group(&mut self) {
        if self.bind_group.is_some() {
            return;
        }
        let Some(camera) = self.camera.as_ref() else {
            return;
        };
        let lut_view = self
            .lut
            .as_ref()
            .map(|lut| &lut.view)
            .unwrap_or(&self.placeholder_lut);

        self.bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lutcam preview bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&camera.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(lut_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.uniform_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<TileParams>() as u64),
                    }),
                },
            ],
        }));
    }
}

/// Fill the uniform block with one `TileParams` slot per draw.
fn encode_tile_params(
    filters: Option<&FilterSet>,
    selection: &SelectionState,
    turns: u32,
    grid: bool,
) -> Vec<u8> {
    let mut block = vec![0u8; (UNIFORM_SLOTS * UNIFORM_STRIDE) as usize];
    let slice_count = filters.map(|set| set.len() as u32).unwrap_or(0).max(1);

    if grid {
        for slot in 0..TILE_COUNT {
            let (filter_slot, grayscale) = match filters {
                Some(set) if slot < set.len() => {
                    (slot as i32, set.entries()[slot].is_grayscale)
                }
                _ => (-1, false),
            };
            write_slot(
                &mut block,
                slot as u32,
                TileParams {
                    rotation: turns,
                    filter_slot,
                    grayscale: if grayscale { 1 } else { 0 },
                    slice_count,
                },
            );
        }
    }

    let (filter_slot, grayscale) = match (filters, selection.committed_slot()) {
        (Some(set), Some(slot)) if slot < set.len() => {
            (slot as i32, set.entries()[slot].is_grayscale)
        }
        _ => (-1, false),
    };
    write_slot(
        &mut block,
        FULL_DRAW_SLOT,
        TileParams {
            rotation: turns,
            filter_slot,
            grayscale: if grayscale { 1 } else { 0 },
            slice_count,
        },
    );

    block
}

fn write_slot(block: &mut [u8], slot: u32, params: TileParams) {
    let start = (slot * UNIFORM_STRIDE) as usize;
    block[start..start + std::mem::size_of::<TileParams>()]
        .copy_from_slice(bytemuck::bytes_of(&params));
}

/// Pixel rectangle of grid slot `slot`, rows counted from the bottom.
///
/// Edges are computed independently so the tiles cover the whole surface
/// even when it does not divide evenly by three.
fn tile_rect(surface: Dimension, slot: usize) -> (u32, u32, u32, u32) {
    let col = slot as u32 % GRID_DIM;
    let row = slot as u32 / GRID_DIM;
    let top_row = GRID_DIM - 1 - row;
    let x0 = col * surface.width / GRID_DIM;
    let x1 = (col + 1) * surface.width / GRID_DIM;
    let y0 = top_row * surface.height / GRID_DIM;
    let y1 = (top_row + 1) * surface.height / GRID_DIM;
    (x0, y0, x1 - x0, y1 - y0)
}

fn create_placeholder_lut(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("lutcam placeholder lut"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255, 255, 255, 255],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Map, poll, read, unmap.
async fn read_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<Vec<u8>, String> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let _ = device.poll(wgpu::PollType::wait_indefinitely());

    receiver
        .await
        .map_err(|_| "buffer mapping callback dropped".to_string())?
        .map_err(|e| format!("failed to map readback buffer: {e:?}"))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}
