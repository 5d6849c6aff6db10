// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Real GPU backend: a WGSL compute shader on a `wgpu` adapter.
//!
//! Images are stored on the device as one `f32` per sample. Each
//! invocation produces one destination pixel by evaluating both kernel
//! axes directly, so no intermediate image is kept on the device. Axis
//! weights are padded to a fixed tap count per axis and uploaded per stage.
//!
//! Results match the CPU lane to within one code value; the summation
//! order differs from the two-pass host resampler.

use super::{DeviceMemory, DispatchJob, GpuDevice};
use crate::DeviceError;
use raster_core::{decode_samples, encode_samples, AxisWeights, Dims, PixelFormat, ResampleKernel, ResamplePlan};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use wgpu::util::DeviceExt;

const WORKGROUP: u32 = 8;

const RESAMPLE_WGSL: &str = r#"
struct Params {
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    channels: u32,
    h_taps: u32,
    v_taps: u32,
    _pad: u32,
};

@group(0) @binding(0) var<storage, read> src: array<f32>;
@group(0) @binding(1) var<storage, read_write> dst: array<f32>;
@group(0) @binding(2) var<storage, read> h_start: array<u32>;
@group(0) @binding(3) var<storage, read> h_weight: array<f32>;
@group(0) @binding(4) var<storage, read> v_start: array<u32>;
@group(0) @binding(5) var<storage, read> v_weight: array<f32>;
@group(0) @binding(6) var<uniform> params: Params;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let x = gid.x;
    let y = gid.y;
    if (x >= params.dst_w || y >= params.dst_h) {
        return;
    }
    let ch = params.channels;
    let hs = h_start[x];
    let vs = v_start[y];
    for (var c: u32 = 0u; c < ch; c = c + 1u) {
        var acc: f32 = 0.0;
        for (var j: u32 = 0u; j < params.v_taps; j = j + 1u) {
            let wv = v_weight[y * params.v_taps + j];
            if (wv == 0.0) {
                continue;
            }
            let sy = min(vs + j, params.src_h - 1u);
            var row: f32 = 0.0;
            for (var i: u32 = 0u; i < params.h_taps; i = i + 1u) {
                let sx = min(hs + i, params.src_w - 1u);
                row = row + h_weight[x * params.h_taps + i] * src[(sy * params.src_w + sx) * ch + c];
            }
            acc = acc + wv * row;
        }
        dst[(y * params.dst_w + x) * ch + c] = acc;
    }
}
"#;

#[repr(C)]
#[derive(Clone, Copy)]
struct Params {
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    channels: u32,
    h_taps: u32,
    v_taps: u32,
    _pad: u32,
}

unsafe impl bytemuck::Pod for Params {}
unsafe impl bytemuck::Zeroable for Params {}

/// Axis weights padded to `taps` entries per destination index.
struct PackedAxis {
    starts: Vec<u32>,
    weights: Vec<f32>,
    taps: u32,
}

impl PackedAxis {
    fn new(axis: &AxisWeights) -> Self {
        let taps = axis.max_span().max(1);
        let mut starts = Vec::with_capacity(axis.len());
        let mut weights = vec![0f32; axis.len() * taps];
        for i in 0..axis.len() {
            let (start, ws) = axis.span(i);
            starts.push(start);
            weights[i * taps..i * taps + ws.len()].copy_from_slice(ws);
        }
        Self { starts, weights, taps: taps as u32 }
    }

    fn device_bytes(axis: &AxisWeights) -> u64 {
        let taps = axis.max_span().max(1) as u64;
        axis.len() as u64 * (1 + taps) * 4
    }
}

struct WgpuBlock {
    buffer: wgpu::Buffer,
    size: u64,
}

impl DeviceMemory for WgpuBlock {
    fn size_bytes(&self) -> u64 {
        self.size
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn block(mem: &dyn DeviceMemory) -> Result<&WgpuBlock, DeviceError> {
    mem.as_any()
        .downcast_ref::<WgpuBlock>()
        .ok_or_else(|| DeviceError::InvalidBuffer("not a wgpu block".into()))
}

struct Compiled {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// [`GpuDevice`] backed by a `wgpu` adapter.
pub struct WgpuDevice {
    name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    max_buffer_bytes: u64,
    lost: Arc<AtomicBool>,
    compiled: Mutex<Option<Arc<Compiled>>>,
}

impl WgpuDevice {
    /// Opens the default high-performance adapter.
    pub fn new() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| DeviceError::DeviceLost(format!("no suitable adapter: {e}")))?;

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("upscale_device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            ..Default::default()
        }))
        .map_err(|e| DeviceError::DeviceLost(format!("request_device failed: {e}")))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            tracing::warn!(?reason, %message, "wgpu device lost");
            flag.store(true, Ordering::Release);
        });

        let name = adapter.get_info().name;
        tracing::info!(adapter = %name, max_buffer = limits.max_buffer_size, "wgpu adapter opened");
        Ok(Self {
            name,
            device,
            queue,
            max_buffer_bytes: limits
                .max_buffer_size
                .min(limits.max_storage_buffer_binding_size as u64),
            lost,
            compiled: Mutex::new(None),
        })
    }

    fn check_alive(&self) -> Result<(), DeviceError> {
        if self.lost.load(Ordering::Acquire) {
            return Err(DeviceError::DeviceLost(format!("{} was lost", self.name)));
        }
        Ok(())
    }

    fn compiled(&self) -> MutexGuard<'_, Option<Arc<Compiled>>> {
        self.compiled.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait(&self, submission: wgpu::SubmissionIndex) -> Result<(), DeviceError> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: None,
            })
            .map_err(|e| DeviceError::DeviceLost(format!("device poll failed: {e:?}")))?;
        self.check_alive()
    }

    fn storage(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::STORAGE,
        })
    }

    fn compile(&self) -> Result<Arc<Compiled>, DeviceError> {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = vec![
            storage(0, true),
            storage(1, false),
            storage(2, true),
            storage(3, true),
            storage(4, true),
            storage(5, true),
        ];
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 6,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("upscale_bgl"),
            entries: &entries,
        });
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("upscale_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("upscale_resample"),
            source: wgpu::ShaderSource::Wgsl(RESAMPLE_WGSL.into()),
        });
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("upscale_resample_pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::KernelCompileFailed(err.to_string()));
        }
        Ok(Arc::new(Compiled { pipeline, layout }))
    }
}

impl GpuDevice for WgpuDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn storage_bytes(&self, dims: Dims, format: PixelFormat) -> u64 {
        dims.pixel_count() * format.channels() as u64 * 4
    }

    fn scratch_bytes(&self, plan: &ResamplePlan) -> u64 {
        // Weight tables, the uniform block and the readback staging buffer.
        PackedAxis::device_bytes(plan.horizontal())
            + PackedAxis::device_bytes(plan.vertical())
            + std::mem::size_of::<Params>() as u64
            + self.storage_bytes(plan.dst(), plan.format())
    }

    fn allocate(&self, bytes: u64) -> Result<Box<dyn DeviceMemory>, DeviceError> {
        self.check_alive()?;
        if bytes > self.max_buffer_bytes {
            return Err(DeviceError::OutOfMemory { requested_bytes: bytes });
        }
        // Storage bindings must be a multiple of four bytes.
        let size = bytes.div_ceil(4) * 4;
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("upscale_image"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            return Err(DeviceError::OutOfMemory { requested_bytes: bytes });
        }
        Ok(Box::new(WgpuBlock { buffer, size }))
    }

    fn prepare(&self, _kernel: ResampleKernel) -> Result<(), DeviceError> {
        self.check_alive()?;
        let mut slot = self.compiled();
        if slot.is_none() {
            *slot = Some(self.compile()?);
        }
        Ok(())
    }

    fn upload(&self, src: &[u8], format: PixelFormat, dst: &mut dyn DeviceMemory) -> Result<(), DeviceError> {
        self.check_alive()?;
        let samples = decode_samples(src, format.depth());
        let bytes: &[u8] = bytemuck::cast_slice(&samples);
        let dst = block(dst)?;
        if bytes.len() as u64 > dst.size {
            return Err(DeviceError::InvalidBuffer(format!(
                "block of {} bytes cannot hold {} bytes",
                dst.size,
                bytes.len()
            )));
        }
        self.queue.write_buffer(&dst.buffer, 0, bytes);
        Ok(())
    }

    fn dispatch(
        &self,
        job: &DispatchJob<'_>,
        src: &dyn DeviceMemory,
        dst: &mut dyn DeviceMemory,
    ) -> Result<(), DeviceError> {
        self.check_alive()?;
        let compiled = self
            .compiled()
            .clone()
            .ok_or_else(|| DeviceError::KernelCompileFailed("kernel not prepared".into()))?;
        let plan = job.plan;
        let src = block(src)?;
        let dst = block(dst)?;
        if self.storage_bytes(plan.dst(), plan.format()) > dst.size {
            return Err(DeviceError::InvalidBuffer("destination block too small".into()));
        }

        let h = PackedAxis::new(plan.horizontal());
        let v = PackedAxis::new(plan.vertical());
        let params = Params {
            src_w: plan.src().width,
            src_h: plan.src().height,
            dst_w: plan.dst().width,
            dst_h: plan.dst().height,
            channels: plan.format().channels() as u32,
            h_taps: h.taps,
            v_taps: v.taps,
            _pad: 0,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let h_start = self.storage("upscale_h_start", bytemuck::cast_slice(&h.starts));
        let h_weight = self.storage("upscale_h_weight", bytemuck::cast_slice(&h.weights));
        let v_start = self.storage("upscale_v_start", bytemuck::cast_slice(&v.starts));
        let v_weight = self.storage("upscale_v_weight", bytemuck::cast_slice(&v.weights));
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("upscale_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            return Err(DeviceError::OutOfMemory { requested_bytes: self.scratch_bytes(plan) });
        }

        let buffers = [&src.buffer, &dst.buffer, &h_start, &h_weight, &v_start, &v_weight, &params_buffer];
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, b)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: b.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("upscale_bind_group"),
            layout: &compiled.layout,
            entries: &entries,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(job.label),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("upscale_resample_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&compiled.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                plan.dst().width.div_ceil(WORKGROUP),
                plan.dst().height.div_ceil(WORKGROUP),
                1,
            );
        }
        let submission = self.queue.submit(Some(encoder.finish()));
        self.wait(submission)
    }

    fn download(&self, src: &dyn DeviceMemory, format: PixelFormat, dst: &mut [u8]) -> Result<(), DeviceError> {
        self.check_alive()?;
        let src = block(src)?;
        let samples = dst.len() / format.depth().size_bytes();
        let size = (samples as u64 * 4).div_ceil(4) * 4;
        if size > src.size {
            return Err(DeviceError::InvalidBuffer("source block too small".into()));
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("upscale_staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("upscale_readback"),
        });
        encoder.copy_buffer_to_buffer(&src.buffer, 0, &staging, 0, size);
        let submission = self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.wait(submission)?;
        rx.recv()
            .map_err(|_| DeviceError::DeviceLost("map channel closed".into()))?
            .map_err(|e| DeviceError::DeviceLost(format!("map failed: {e}")))?;

        {
            let data = slice.get_mapped_range();
            let values: &[f32] = bytemuck::cast_slice(&data);
            encode_samples(&values[..samples], format.depth(), dst);
        }
        staging.unmap();
        Ok(())
    }
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("name", &self.name)
            .field("max_buffer_bytes", &self.max_buffer_bytes)
            .field("lost", &self.lost.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_axis_pads_taps() {
        let axis = AxisWeights::new(4, 8, ResampleKernel::Bilinear);
        let packed = PackedAxis::new(&axis);
        assert_eq!(packed.starts.len(), 8);
        assert_eq!(packed.weights.len(), 8 * packed.taps as usize);
        for i in 0..8 {
            let row = &packed.weights[i * packed.taps as usize..(i + 1) * packed.taps as usize];
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
        assert_eq!(PackedAxis::device_bytes(&axis), 8 * (1 + packed.taps as u64) * 4);
    }
}
