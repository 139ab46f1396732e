// Presentation chain lifecycle
//
// Tracks whether the swapchain and everything built on it can be used for
// the next frame. The render loop asks `next_action` once per frame; window
// events and swapchain results feed the transitions.
//
//   Stale ──rebuilt(w,h>0)──> Live ──mark_stale / resize──> Stale
//     │                        │
//     └──resize(0) / rebuilt(0)┴──> Suspended ──resize(w,h>0)──> Stale

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Chain matches the window and can be drawn with
    Live,
    /// Chain is missing or out of date and must be rebuilt first
    Stale,
    /// Window has no area; nothing is built or drawn
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    Render,
    Recreate,
    Skip,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: ChainState,
    built_size: Option<(u32, u32)>,
    builds: u32,
}

impl Lifecycle {
    /// Starts stale: the first frame builds the chain
    pub fn new() -> Self {
        Self {
            state: ChainState::Stale,
            built_size: None,
            builds: 0,
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Number of times a chain has been built (initial build included)
    pub fn builds(&self) -> u32 {
        self.builds
    }

    pub fn next_action(&self) -> FrameAction {
        match self.state {
            ChainState::Live => FrameAction::Render,
            ChainState::Stale => FrameAction::Recreate,
            ChainState::Suspended => FrameAction::Skip,
        }
    }

    /// Window size changed
    pub fn on_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.state = ChainState::Suspended;
            return;
        }

        let unchanged = self.built_size == Some((width, height));
        self.state = match self.state {
            ChainState::Live if unchanged => ChainState::Live,
            _ => ChainState::Stale,
        };
    }

    /// Swapchain reported OUT_OF_DATE or suboptimal
    pub fn mark_stale(&mut self) {
        if self.state == ChainState::Live {
            self.state = ChainState::Stale;
        }
    }

    /// A rebuild finished for the given window size. A zero-area window
    /// means nothing was built.
    pub fn rebuilt(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.state = ChainState::Suspended;
            self.built_size = None;
            return;
        }

        self.state = ChainState::Live;
        self.built_size = Some((width, height));
        self.builds += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_at(width: u32, height: u32) -> Lifecycle {
        let mut lifecycle = Lifecycle::new();
        lifecycle.rebuilt(width, height);
        lifecycle
    }

    #[test]
    fn first_frame_builds_the_chain() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.next_action(), FrameAction::Recreate);

        lifecycle.rebuilt(600, 400);
        assert_eq!(lifecycle.next_action(), FrameAction::Render);
        assert_eq!(lifecycle.builds(), 1);
    }

    #[test]
    fn resize_forces_recreation() {
        let mut lifecycle = live_at(600, 400);
        lifecycle.on_resize(800, 600);
        assert_eq!(lifecycle.next_action(), FrameAction::Recreate);

        lifecycle.rebuilt(800, 600);
        assert_eq!(lifecycle.state(), ChainState::Live);
        assert_eq!(lifecycle.builds(), 2);
    }

    #[test]
    fn resize_to_built_size_keeps_chain() {
        let mut lifecycle = live_at(600, 400);
        lifecycle.on_resize(600, 400);
        assert_eq!(lifecycle.next_action(), FrameAction::Render);
    }

    #[test]
    fn minimize_suspends_until_restored() {
        let mut lifecycle = live_at(600, 400);
        lifecycle.on_resize(0, 0);
        assert_eq!(lifecycle.next_action(), FrameAction::Skip);

        // Swapchain errors while suspended do not wake it up
        lifecycle.mark_stale();
        assert_eq!(lifecycle.state(), ChainState::Suspended);

        // Restoring to the old size still rebuilds: the chain was left behind
        lifecycle.on_resize(600, 400);
        assert_eq!(lifecycle.next_action(), FrameAction::Recreate);
    }

    #[test]
    fn out_of_date_marks_live_chain_stale() {
        let mut lifecycle = live_at(600, 400);
        lifecycle.mark_stale();
        assert_eq!(lifecycle.next_action(), FrameAction::Recreate);
    }

    #[test]
    fn rebuild_with_zero_area_suspends() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.rebuilt(0, 400);
        assert_eq!(lifecycle.state(), ChainState::Suspended);
        assert_eq!(lifecycle.builds(), 0);

        lifecycle.on_resize(600, 400);
        assert_eq!(lifecycle.next_action(), FrameAction::Recreate);
    }
}
