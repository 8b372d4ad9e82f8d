use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::config::{HIGHLIGHT_HIDE, HIGHLIGHT_PARTIAL, HIGHLIGHT_REVEAL};
use crate::*;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MouseButtons: u16 {
        const LEFT    = 1;
        const RIGHT   = 1 << 1;
        const MIDDLE  = 1 << 2;
        const BACK    = 1 << 3;
        const FORWARD = 1 << 4;
    }
}

/// Editing tool picked in the toolbar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    Toggle,
    Reveal,
    Hide,
    Partial,
}

impl Tool {
    /// What a click with this tool does to a space in `state`.
    pub const fn action_for(self, state: RevealState) -> Option<PaintAction> {
        use PaintAction as A;
        use RevealState::*;
        match (self, state) {
            (Tool::Toggle, Revealed | Partial) => Some(A::Hide),
            (Tool::Toggle, Hidden) => Some(A::Reveal),
            (Tool::Reveal, Hidden) => Some(A::Reveal),
            (Tool::Hide, Revealed | Partial) => Some(A::Hide),
            (Tool::Partial, Hidden) => Some(A::Partial),
            _ => None,
        }
    }

    /// Toggling while dragging would flicker the space under the cursor.
    pub const fn can_drag(self) -> bool {
        !matches!(self, Self::Toggle)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PaintAction {
    Reveal,
    Partial,
    Hide,
}

impl PaintAction {
    pub const fn resulting_state(self) -> RevealState {
        match self {
            Self::Reveal => RevealState::Revealed,
            Self::Partial => RevealState::Partial,
            Self::Hide => RevealState::Hidden,
        }
    }

    pub const fn highlight_color(self) -> Color {
        match self {
            Self::Reveal => HIGHLIGHT_REVEAL,
            Self::Partial => HIGHLIGHT_PARTIAL,
            Self::Hide => HIGHLIGHT_HIDE,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
}

/// Pointer event as delivered by the host, already in scene coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointerInput {
    pub kind: PointerKind,
    pub position: Point,
    /// Button that changed, `0` is the primary button.
    pub button: i16,
    /// Buttons held down.
    pub buttons: MouseButtons,
    /// Whether the event originated on the board canvas rather than a UI element above it.
    pub on_board: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EditState {
    #[default]
    Idle,
    Editing(Tool),
}

/// Where the current drag started.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DragOrigin {
    /// No drag going on.
    #[default]
    Undetermined,
    Canvas,
    /// Started on some other element, nothing gets painted until released.
    Blocked,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PaintIntent {
    pub action: PaintAction,
    pub offset: GridOffset,
    pub position: Point,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Highlight {
    Keep,
    Clear,
    Show { offset: GridOffset, color: Color },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PaintOutcome {
    pub intent: Option<PaintIntent>,
    pub highlight: Highlight,
}

impl PaintOutcome {
    const NONE: Self = Self {
        intent: None,
        highlight: Highlight::Keep,
    };
}

/// Pointer handling while the reveal tools are active.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaintSession {
    state: EditState,
    drag: DragOrigin,
}

impl PaintSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, tool: Tool) {
        self.state = EditState::Editing(tool);
    }

    pub fn stop(&mut self) {
        self.state = EditState::Idle;
        self.drag = DragOrigin::Undetermined;
    }

    pub fn drag(&self) -> DragOrigin {
        self.drag
    }

    pub fn tool(&self) -> Option<Tool> {
        match self.state {
            EditState::Editing(tool) => Some(tool),
            EditState::Idle => None,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.tool().is_some()
    }

    fn can_edit(&self, input: &PointerInput, active: bool) -> bool {
        self.drag != DragOrigin::Blocked
            && active
            && self.is_editing()
            && (self.drag == DragOrigin::Canvas || input.on_board)
    }

    /// Feeds a pointer event through the session. `offset` and `state` describe the space
    /// under the pointer, `active` whether the layer accepts edits at all.
    pub fn handle(
        &mut self,
        input: &PointerInput,
        offset: GridOffset,
        state: RevealState,
        active: bool,
    ) -> PaintOutcome {
        match input.kind {
            PointerKind::Up => {
                self.drag = DragOrigin::Undetermined;
                PaintOutcome::NONE
            }
            PointerKind::Down => self.pointer_down(input, offset, state, active),
            PointerKind::Move => self.pointer_move(input, offset, state, active),
        }
    }

    fn pointer_down(
        &mut self,
        input: &PointerInput,
        offset: GridOffset,
        state: RevealState,
        active: bool,
    ) -> PaintOutcome {
        if !self.can_edit(input, active) {
            self.drag = DragOrigin::Blocked;
            return PaintOutcome::NONE;
        }
        self.drag = DragOrigin::Canvas;

        let Some(tool) = self.tool() else {
            return PaintOutcome::NONE;
        };
        if input.button != 0 {
            return PaintOutcome::NONE;
        }
        match tool.action_for(state) {
            Some(action) => PaintOutcome {
                intent: Some(PaintIntent {
                    action,
                    offset,
                    position: input.position,
                }),
                highlight: Highlight::Show {
                    offset,
                    color: action.highlight_color(),
                },
            },
            None => PaintOutcome::NONE,
        }
    }

    fn pointer_move(
        &mut self,
        input: &PointerInput,
        offset: GridOffset,
        state: RevealState,
        active: bool,
    ) -> PaintOutcome {
        let primary_held = input.buttons == MouseButtons::LEFT;
        if !primary_held {
            self.drag = DragOrigin::Undetermined;
        }

        if !self.can_edit(input, active) {
            if primary_held {
                self.drag = DragOrigin::Blocked;
            }
            return PaintOutcome {
                intent: None,
                highlight: Highlight::Clear,
            };
        }

        let Some(tool) = self.tool() else {
            return PaintOutcome::NONE;
        };
        let action = tool.action_for(state);
        let highlight = match action {
            Some(action) => Highlight::Show {
                offset,
                color: action.highlight_color(),
            },
            None => Highlight::Clear,
        };

        let intent = if primary_held && tool.can_drag() {
            self.drag = DragOrigin::Canvas;
            action.map(|action| PaintIntent {
                action,
                offset,
                position: input.position,
            })
        } else {
            None
        };

        PaintOutcome { intent, highlight }
    }
}
