use anyhow::Result;
use tracing::{debug, info, warn};

use crate::hardware::{ChannelId, DisplayPipeline, Indicator};
use crate::input::{ButtonEvent, EncoderEvent};
use crate::system::audio::{AudioBackend, AudioError, Target};

use super::bindings::BindingRegistry;
use super::menu::{MenuEntry, MenuModel};

#[derive(Debug, Clone)]
pub enum ChannelMode {
    Control,
    Menu(MenuModel),
}

/// Collaborators a channel acts through while handling one event.
pub struct ChannelContext<'a, A, D> {
    pub bindings: &'a BindingRegistry,
    pub audio: &'a A,
    pub display: &'a D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressState {
    Idle,
    Held,
    /// The hold crossed the long-press threshold; its release is not a click.
    LongHeld,
}

pub fn indicator_for(mode: &ChannelMode, bound: bool) -> Indicator {
    match (mode, bound) {
        (ChannelMode::Menu(_), _) => Indicator::Blinking,
        (ChannelMode::Control, true) => Indicator::SolidOn,
        (ChannelMode::Control, false) => Indicator::Off,
    }
}

#[derive(Debug)]
pub struct ChannelStateMachine {
    channel: ChannelId,
    mode: ChannelMode,
    press: PressState,
}

impl ChannelStateMachine {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            mode: ChannelMode::Control,
            press: PressState::Idle,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn mode(&self) -> &ChannelMode {
        &self.mode
    }

    pub fn menu(&self) -> Option<&MenuModel> {
        match &self.mode {
            ChannelMode::Menu(menu) => Some(menu),
            ChannelMode::Control => None,
        }
    }

    pub fn indicator(&self, bindings: &BindingRegistry) -> Indicator {
        indicator_for(&self.mode, bindings.is_bound(self.channel))
    }

    /// Forgets a hold in progress. Mode and binding are untouched.
    pub fn cancel_press(&mut self) {
        self.press = PressState::Idle;
    }

    /// Publishes the initial indicator state.
    pub fn start<A, D>(&mut self, ctx: &ChannelContext<'_, A, D>) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        self.sync_indicator(ctx)
    }

    pub fn handle_encoder<A, D>(
        &mut self,
        ctx: &ChannelContext<'_, A, D>,
        event: EncoderEvent,
    ) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        if let ChannelMode::Menu(menu) = &mut self.mode {
            if !menu.step(event) {
                return Ok(());
            }
            let bound = ctx.bindings.get(self.channel);
            let view = menu.view(bound.as_ref().map(|target| &target.id));
            return ctx.display.update_menu(self.channel, Some(view));
        }

        let Some(target) = ctx.bindings.get(self.channel) else {
            debug!(channel = self.channel.number(), "rotation ignored; channel unbound");
            return Ok(());
        };
        match ctx.audio.adjust_volume(&target, event.delta()) {
            Ok(()) => Ok(()),
            Err(err) => self.handle_audio_error(ctx, &target, err),
        }
    }

    pub fn handle_button<A, D>(
        &mut self,
        ctx: &ChannelContext<'_, A, D>,
        event: ButtonEvent,
    ) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        match event {
            ButtonEvent::Pressed => {
                self.press = PressState::Held;
                Ok(())
            }
            ButtonEvent::LongPressThresholdReached => {
                self.press = PressState::LongHeld;
                match self.mode {
                    ChannelMode::Control => self.open_menu(ctx),
                    ChannelMode::Menu(_) => self.refresh_menu(ctx),
                }
            }
            ButtonEvent::Released => {
                let press = std::mem::replace(&mut self.press, PressState::Idle);
                if press != PressState::Held {
                    return Ok(());
                }
                match self.mode {
                    ChannelMode::Control => self.toggle_mute(ctx),
                    ChannelMode::Menu(_) => self.select(ctx),
                }
            }
        }
    }

    fn toggle_mute<A, D>(&mut self, ctx: &ChannelContext<'_, A, D>) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        let Some(target) = ctx.bindings.get(self.channel) else {
            debug!(channel = self.channel.number(), "press ignored; channel unbound");
            return Ok(());
        };
        match ctx.audio.toggle_mute(&target) {
            Ok(muted) => {
                info!(channel = self.channel.number(), target = %target, muted, "toggled mute");
                Ok(())
            }
            Err(err) => self.handle_audio_error(ctx, &target, err),
        }
    }

    fn open_menu<A, D>(&mut self, ctx: &ChannelContext<'_, A, D>) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        let bound = ctx.bindings.get(self.channel);
        let bound_id = bound.as_ref().map(|target| &target.id);
        let menu = MenuModel::new(query_targets(self.channel, ctx), bound_id);
        info!(
            channel = self.channel.number(),
            targets = menu.targets().count(),
            "opening binding menu"
        );
        let view = menu.view(bound_id);
        self.mode = ChannelMode::Menu(menu);
        self.sync_indicator(ctx)?;
        ctx.display.update_menu(self.channel, Some(view))
    }

    fn refresh_menu<A, D>(&mut self, ctx: &ChannelContext<'_, A, D>) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        let targets = query_targets(self.channel, ctx);
        let ChannelMode::Menu(menu) = &mut self.mode else {
            return Ok(());
        };
        menu.refresh(targets);
        debug!(
            channel = self.channel.number(),
            entries = menu.len(),
            cursor = menu.cursor(),
            "refreshed binding menu"
        );
        let bound = ctx.bindings.get(self.channel);
        let view = menu.view(bound.as_ref().map(|target| &target.id));
        ctx.display.update_menu(self.channel, Some(view))
    }

    fn select<A, D>(&mut self, ctx: &ChannelContext<'_, A, D>) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        let Some(entry) = self.menu().and_then(MenuModel::selected).cloned() else {
            debug!(channel = self.channel.number(), "nothing to select; menu is empty");
            return Ok(());
        };

        let target = match entry {
            MenuEntry::Unbind => {
                info!(channel = self.channel.number(), "channel unbound");
                None
            }
            MenuEntry::Target(target) => {
                info!(channel = self.channel.number(), target = %target, "channel bound");
                Some(target)
            }
        };
        ctx.bindings.bind(self.channel, target);
        self.mode = ChannelMode::Control;
        self.sync_indicator(ctx)?;
        ctx.display.update_menu(self.channel, None)
    }

    fn handle_audio_error<A, D>(
        &mut self,
        ctx: &ChannelContext<'_, A, D>,
        target: &Target,
        err: AudioError,
    ) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        match err {
            AudioError::NotFound(_) => {
                if !ctx.bindings.invalidate(self.channel, &target.id) {
                    return Ok(());
                }
                warn!(
                    channel = self.channel.number(),
                    target = %target,
                    "bound target disappeared; channel unbound"
                );
                self.sync_indicator(ctx)
            }
            other => {
                warn!(
                    channel = self.channel.number(),
                    target = %target,
                    error = %other,
                    "audio request failed"
                );
                Ok(())
            }
        }
    }

    fn sync_indicator<A, D>(&self, ctx: &ChannelContext<'_, A, D>) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        ctx.display
            .update_indicator(self.channel, self.indicator(ctx.bindings))
    }
}

fn query_targets<A, D>(channel: ChannelId, ctx: &ChannelContext<'_, A, D>) -> Vec<Target>
where
    A: AudioBackend,
{
    match ctx.audio.enumerate_targets() {
        Ok(targets) => targets,
        Err(err) => {
            warn!(
                channel = channel.number(),
                error = %err,
                "failed to enumerate audio targets; menu is empty"
            );
            Vec::new()
        }
    }
}
