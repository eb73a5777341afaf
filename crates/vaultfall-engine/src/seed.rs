//! Seed data for local development.
//!
//! A fresh deployment with no vaults is hard to poke at, so the server
//! can create one demo vault at startup: a small functioning economy
//! with all three production chains staffed.

use vaultfall_store::NewVault;
use vaultfall_types::{
    Dweller, DwellerId, ResourceKind, ResourcePool, Room, RoomId, VaultResources,
};

/// Build the demo vault created at startup when the store is empty.
pub fn demo_vault() -> NewVault {
    starter_vault("Vault 111")
}

/// Build a starter vault: five rooms in a row, six dwellers, half-full
/// reservoirs. This is the layout every newly created vault begins with.
pub fn starter_vault(name: &str) -> NewVault {
    let generator = production_room("Generator Room", ResourceKind::Power, 0.5, 2, 1);
    let diner = production_room("Diner", ResourceKind::Food, 0.4, 2, 1);
    let water_plant = production_room("Water Treatment", ResourceKind::Water, 0.4, 2, 1);
    let living_quarters = Room {
        id: RoomId::new(),
        name: "Living Quarters".to_owned(),
        produces: None,
        output: 0.0,
        size: 3,
        tier: 1,
    };
    let storage = Room {
        id: RoomId::new(),
        name: "Storage Room".to_owned(),
        produces: None,
        output: 0.0,
        size: 1,
        tier: 1,
    };

    let dwellers = vec![
        dweller("Avery Cole", Some(generator.id), 3.0),
        dweller("Morgan Reyes", Some(generator.id), 2.5),
        dweller("Riley Nakamura", Some(diner.id), 3.5),
        dweller("Jordan Okafor", Some(diner.id), 2.0),
        dweller("Casey Lindqvist", Some(water_plant.id), 3.0),
        dweller("Quinn Abara", None, 1.5),
    ];

    NewVault {
        name: name.to_owned(),
        resources: VaultResources {
            power: ResourcePool::new(500.0, 1000.0),
            food: ResourcePool::new(500.0, 1000.0),
            water: ResourcePool::new(500.0, 1000.0),
        },
        rooms: vec![generator, diner, water_plant, living_quarters, storage],
        dwellers,
    }
}

fn production_room(name: &str, produces: ResourceKind, output: f64, size: u32, tier: u32) -> Room {
    Room {
        id: RoomId::new(),
        name: name.to_owned(),
        produces: Some(produces),
        output,
        size,
        tier,
    }
}

fn dweller(name: &str, room_id: Option<RoomId>, ability: f64) -> Dweller {
    Dweller {
        id: DwellerId::new(),
        name: name.to_owned(),
        room_id,
        health: 100.0,
        is_alive: true,
        ability,
    }
}
