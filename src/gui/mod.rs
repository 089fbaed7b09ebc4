//! Window and GPU display plumbing.
//!
//! This module only provides the pieces needed to put a camera frame on screen: a [`Gpu`] handle,
//! a [`Window`], and a [`Renderer`] that blits an RGBA image to it. The event loop itself lives
//! with the monitoring driver in [`crate::app`], which runs everything on a single thread.

mod renderer;

use std::sync::OnceLock;

use wgpu::{Adapter, Backends, Device, DeviceDescriptor, Instance, Queue, RequestAdapterOptions};

pub use renderer::{Renderer, Window};

/// A handle to a GPU.
///
/// Caretaker uses a global GPU handle that can be accessed with [`Gpu::get()`].
pub struct Gpu {
    instance: Instance,
    adapter: Adapter,
    device: Device,
    queue: Queue,
}

static INSTANCE: OnceLock<Gpu> = OnceLock::new();

impl Gpu {
    /// Returns a reference to the global GPU handle.
    ///
    /// If the global GPU handle hasn't been initialized yet, an appropriate default GPU will be
    /// opened. If this fails, this method will panic (an unusable display is fatal at startup).
    pub fn get() -> &'static Gpu {
        INSTANCE.get_or_init(|| pollster::block_on(Self::open()).unwrap())
    }

    /// Opens a suitable default GPU.
    pub async fn open() -> anyhow::Result<Self> {
        // The OpenGL backend panics spuriously, so don't enable it.
        let backends = Backends::PRIMARY;
        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        log::info!("available graphics adapters:");
        for adapter in instance.enumerate_adapters(backends) {
            let info = adapter.get_info();
            log::info!("- {} ({:?}, {:?})", info.name, info.device_type, info.backend);
        }

        let adapter = instance
            .request_adapter(&RequestAdapterOptions::default())
            .await
            .ok_or_else(|| anyhow::anyhow!("no suitable graphics adapter found"))?;
        let info = adapter.get_info();
        log::info!("using {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor::default(), None)
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }
}
