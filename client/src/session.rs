use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use pizarra_shared::{decode, encode, Inbound, StrokeSegment, WireMessage};

use crate::color::WHITE;
use crate::config::{ConfigError, SessionConfig};
use crate::raster::{RasterSurface, SurfaceError};
use crate::sampler::StrokeSampler;
use crate::tools::ToolState;
use crate::transport::{ConnectionState, MessageHandler, Transport, TransportError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Owns one surface, one sampler and one transport session.
///
/// Local segments are published and painted when the broker echoes them
/// back, so every client applies strokes in the broker's order. With
/// `optimistic_paint` the segment is also painted right away; the echo then
/// redraws the same pixels.
pub struct SessionController<T: Transport> {
    transport: T,
    surface: Rc<RefCell<RasterSurface>>,
    sampler: StrokeSampler,
    destination: String,
    optimistic_paint: bool,
    shut_down: bool,
}

impl<T: Transport> SessionController<T> {
    pub fn initialize(config: &SessionConfig, mut transport: T) -> Result<Self, SessionError> {
        if let Err(error) = config.validate() {
            transport.deactivate();
            return Err(error.into());
        }
        let surface = match RasterSurface::new(config.width, config.height, WHITE) {
            Ok(surface) => surface,
            Err(error) => {
                transport.deactivate();
                return Err(error.into());
            }
        };

        let mut controller = Self {
            transport,
            surface: Rc::new(RefCell::new(surface)),
            sampler: StrokeSampler::new(config.width, config.height, config.exit_policy),
            destination: config.destination.clone(),
            optimistic_paint: config.optimistic_paint,
            shut_down: false,
        };
        let router = inbound_router(controller.surface.clone());
        controller.transport.subscribe(&config.topic, router);
        if let Err(error) = controller.transport.activate() {
            controller.shutdown();
            return Err(error.into());
        }
        log::info!(
            "Whiteboard session started {}x{} topic={} destination={}",
            config.width,
            config.height,
            config.topic,
            config.destination
        );
        Ok(controller)
    }

    pub fn pointer_down(&mut self, x: i32, y: i32) -> bool {
        !self.shut_down && self.sampler.pointer_down(x, y)
    }

    pub fn pointer_up(&mut self) {
        self.sampler.pointer_up();
    }

    /// Samples the pointer once. An emitted segment is published to the
    /// draw destination and returned.
    pub fn tick(&mut self, x: i32, y: i32, tools: &ToolState) -> Option<StrokeSegment> {
        if self.shut_down {
            return None;
        }
        let segment = self.sampler.tick(x, y, tools)?;
        if self.optimistic_paint {
            self.surface.borrow_mut().draw_segment(&segment);
        }
        log::trace!("Publishing segment {segment:?}");
        self.publish(&WireMessage::Stroke(segment.clone()));
        Some(segment)
    }

    /// Clears locally and asks every other client to do the same.
    pub fn request_clear(&mut self) -> bool {
        if self.shut_down {
            return false;
        }
        self.surface.borrow_mut().clear();
        self.publish(&WireMessage::Clear)
    }

    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.sampler.pointer_up();
        self.transport.deactivate();
        self.surface.borrow_mut().dispose();
        log::info!("Whiteboard session shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn is_active(&self) -> bool {
        self.sampler.is_active()
    }

    pub fn last_point(&self) -> Option<(i32, i32)> {
        self.sampler.last()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn optimistic_paint(&self) -> bool {
        self.optimistic_paint
    }

    pub fn with_surface<R>(&self, f: impl FnOnce(&mut RasterSurface) -> R) -> R {
        f(&mut self.surface.borrow_mut())
    }

    fn publish(&mut self, message: &WireMessage) -> bool {
        match encode(message) {
            Ok(body) => self.transport.publish(&self.destination, &body),
            Err(error) => {
                log::warn!("Could not encode outgoing message: {error}");
                false
            }
        }
    }
}

impl<T: Transport> Drop for SessionController<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn inbound_router(surface: Rc<RefCell<RasterSurface>>) -> MessageHandler {
    Box::new(move |body: &str| match decode(body) {
        Inbound::Stroke(segment) => surface.borrow_mut().draw_segment(&segment),
        Inbound::Clear => {
            log::debug!("Remote clear");
            surface.borrow_mut().clear();
        }
        Inbound::Unknown => log::trace!("Dropping unrecognised payload {body:?}"),
    })
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
