pub mod combat_calc;
pub mod experience;
pub mod harvest;
pub mod movement;
pub mod skill;
