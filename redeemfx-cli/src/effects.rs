// File: redeemfx-cli/src/effects.rs
//
// A toy "game" and a handful of effects, enough to exercise every outcome
// the processor understands.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::anyhow;
use rand::Rng;
use tracing::info;

use redeemfx_common::models::{Outcome, RewardDefinition};
use redeemfx_core::RewardRegistry;
use redeemfx_core::services::Scheduler;

const RESPAWN_SECS: f64 = 5.0;
const INVERT_TIMER: &str = "invert_controls";
const INVERT_SECS: f64 = 30.0;

#[derive(Debug, Default)]
pub struct DemoGame {
    pub player_alive: bool,
    pub spears: u32,
    pub controls_inverted: bool,
    pub lizards: u32,
}

pub type SharedGame = Rc<RefCell<DemoGame>>;

pub fn new_game() -> SharedGame {
    Rc::new(RefCell::new(DemoGame {
        player_alive: true,
        ..Default::default()
    }))
}

pub fn demo_registry(game: &SharedGame, scheduler: &Scheduler) -> RewardRegistry {
    RewardRegistry::new()
        .register(RewardDefinition::new("Kill").with_cost(500).with_delay(60), {
            let game = game.clone();
            let scheduler = scheduler.clone();
            move || kill(&game, &scheduler)
        })
        .register(
            RewardDefinition::new("Give Spear").with_cost(50).available_in_menu(true),
            {
                let game = game.clone();
                move || {
                    game.borrow_mut().spears += 1;
                    Ok(Outcome::Done)
                }
            },
        )
        .register(RewardDefinition::new("Invert Controls").with_cost(200).with_delay(30), {
            let game = game.clone();
            let scheduler = scheduler.clone();
            move || invert_controls(&game, &scheduler)
        })
        .register(
            RewardDefinition::new("Spawn Dead Red Lizard")
                .with_display_name("Spawn Red Lizard")
                .with_cost(100),
            {
                let game = game.clone();
                move || {
                    game.borrow_mut().lizards += 1;
                    Ok(Outcome::Done)
                }
            },
        )
        .register(RewardDefinition::new("Mystery Gift").with_cost(25), mystery_gift)
}

fn kill(game: &SharedGame, scheduler: &Scheduler) -> anyhow::Result<Outcome> {
    if !game.borrow().player_alive {
        // Already dead; worth another go after the respawn.
        return Ok(Outcome::TryLater);
    }
    game.borrow_mut().player_alive = false;

    let game = game.clone();
    scheduler.set(RESPAWN_SECS, move || game.borrow_mut().player_alive = true);
    Ok(Outcome::Done)
}

fn invert_controls(game: &SharedGame, scheduler: &Scheduler) -> anyhow::Result<Outcome> {
    scheduler.fast_forward(INVERT_TIMER);
    game.borrow_mut().controls_inverted = true;

    let (game, s) = (game.clone(), scheduler.clone());
    scheduler.set_named(INVERT_TIMER, INVERT_SECS, move || {
        game.borrow_mut().controls_inverted = false;
        if !s.is_fast_forwarding() {
            info!("Controls are back to normal");
        }
    });
    Ok(Outcome::Done)
}

fn mystery_gift() -> anyhow::Result<Outcome> {
    match rand::rng().random_range(0..10) {
        0 => Err(anyhow!("gift box fell out of the world")),
        1..=4 => Ok(Outcome::TryLater),
        _ => Ok(Outcome::Done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_controls_wears_off() {
        let game = new_game();
        let scheduler = Scheduler::new();
        let (_, handlers) = demo_registry(&game, &scheduler).into_parts();

        assert_eq!(handlers.invoke("Invert Controls"), Outcome::Done);
        assert!(game.borrow().controls_inverted);
        scheduler.tick(INVERT_SECS);
        assert!(!game.borrow().controls_inverted);
    }

    #[test]
    fn second_kill_waits_for_the_respawn() {
        let game = new_game();
        let scheduler = Scheduler::new();

        assert_eq!(kill(&game, &scheduler).unwrap(), Outcome::Done);
        assert_eq!(kill(&game, &scheduler).unwrap(), Outcome::TryLater);
        scheduler.tick(RESPAWN_SECS);
        assert_eq!(kill(&game, &scheduler).unwrap(), Outcome::Done);
    }
}
