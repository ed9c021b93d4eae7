//! Built-in routine catalog.
//!
//! Routines are static, ordered task lists grouped by theme. Each routine
//! carries the ledger keys the completion flow writes (per-task counter and
//! per-routine score) and which routine it unlocks next, forming a fixed
//! progression chain from the morning routine through to the marriage
//! routine.
//!
//! Lookup never fails: an unknown key resolves to the morning routine. That
//! fallback is a policy inherited from the product (routine availability is
//! driven by what the caller offers the child), not an error path -- but it
//! does mean a typo in a routine key silently plays the morning routine.

use serde::{Deserialize, Serialize};

/// One confirmable step within a routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    /// Child-facing instruction text.
    pub instruction: String,
    /// The phrase the child is coached to say on completion.
    pub expected_speech: String,
    /// Bundled stock artwork shown until (or instead of) a generated reward.
    pub artwork_id: String,
    /// Prompt for the reward-image generator; empty means derive from title.
    pub image_prompt: String,
}

impl Task {
    fn new(
        title: &str,
        instruction: &str,
        expected_speech: &str,
        artwork_id: &str,
        image_prompt: &str,
    ) -> Self {
        Self {
            title: title.into(),
            instruction: instruction.into(),
            expected_speech: expected_speech.into(),
            artwork_id: artwork_id.into(),
            image_prompt: image_prompt.into(),
        }
    }
}

/// An ordered task list with its ledger keys and progression link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    /// Short key, also used as the routine-score key in the ledger.
    pub key: String,
    pub display_name: String,
    /// Key under which completions are counted in the ledger.
    pub task_counter_key: String,
    /// Routine unlocked when this one completes; `None` ends the chain.
    pub unlocks_next: Option<String>,
    pub tasks: Vec<Task>,
}

/// Resolve a routine key (or display name), case-insensitive and trimmed.
///
/// Unknown keys fall back to the morning routine; see the module docs.
pub fn get_routine(key: &str) -> Routine {
    let wanted = key.trim().to_lowercase();
    all_routines()
        .into_iter()
        .find(|r| r.key == wanted || r.display_name.to_lowercase() == wanted)
        .unwrap_or_else(|| {
            tracing::debug!(key, "unknown routine key, falling back to morning");
            morning()
        })
}

/// Every built-in routine, in progression-chain order.
pub fn all_routines() -> Vec<Routine> {
    vec![
        morning(),
        bedtime(),
        mealtime(),
        school(),
        transportation(),
        animals(),
        birds(),
        shapes(),
        hospital(),
        marriage(),
    ]
}

fn routine(
    key: &str,
    display_name: &str,
    task_counter_key: &str,
    unlocks_next: Option<&str>,
    tasks: Vec<Task>,
) -> Routine {
    Routine {
        key: key.into(),
        display_name: display_name.into(),
        task_counter_key: task_counter_key.into(),
        unlocks_next: unlocks_next.map(Into::into),
        tasks,
    }
}

fn morning() -> Routine {
    routine(
        "morning",
        "Morning Routine",
        "brushing",
        Some("bedtime"),
        vec![
            Task::new(
                "Brush Teeth",
                "Brush your teeth!",
                "I brushed my teeth",
                "img_brush_teeth",
                "cute 3d cartoon boy brushing teeth happily, sparkles, pixar style",
            ),
            Task::new(
                "Wash Face",
                "Wash your face!",
                "I washed my face",
                "img_wash_face",
                "cute 3d cartoon boy washing face with water splash, pixar style",
            ),
            Task::new(
                "Get Dressed",
                "Put on your clothes!",
                "I am dressed",
                "img_dress_up",
                "cute 3d cartoon boy wearing colorful t-shirt, pixar style",
            ),
            Task::new(
                "Eat Breakfast",
                "Eat your yummy food!",
                "I ate my breakfast",
                "img_breakfast",
                "cute 3d cartoon boy eating cereal, pixar style",
            ),
        ],
    )
}

fn bedtime() -> Routine {
    routine(
        "bedtime",
        "Bedtime Routine",
        "bedtime",
        Some("meal"),
        vec![
            Task::new(
                "Toy Cleanup",
                "Put your toys away!",
                "I cleaned up my toys",
                "img_toys",
                "cute 3d bedroom with toys in box, pixar style",
            ),
            Task::new(
                "Put on Pajamas",
                "Wear your pajamas!",
                "I am in my pajamas",
                "img_pajamas",
                "cute 3d cartoon boy in blue pajamas, pixar style",
            ),
            Task::new(
                "Story Time",
                "Read a book!",
                "I read a book",
                "img_reading",
                "cute 3d cartoon boy reading a book in bed, pixar style",
            ),
            Task::new(
                "Go to Sleep",
                "Goodnight!",
                "Goodnight",
                "img_sleep",
                "cute 3d cartoon boy sleeping in bed, pixar style",
            ),
        ],
    )
}

fn mealtime() -> Routine {
    routine(
        "meal",
        "Mealtime Routine",
        "meal",
        Some("school"),
        vec![
            Task::new(
                "Wash Hands",
                "Wash hands with soap!",
                "I washed my hands",
                "img_wash_hands",
                "cute 3d cartoon hands with soap bubbles, pixar style",
            ),
            Task::new(
                "Eat Veggies",
                "Finish your veggies!",
                "I ate my veggies",
                "img_veggies",
                "cute 3d cartoon boy eating broccoli and smiling, pixar style",
            ),
            Task::new(
                "Drink Water",
                "Drink your water!",
                "I drank my water",
                "img_drink_water",
                "cute 3d cartoon boy holding glass of water, pixar style",
            ),
        ],
    )
}

fn school() -> Routine {
    routine(
        "school",
        "School Routine",
        "school",
        Some("transport"),
        vec![
            Task::new(
                "Pack Bag",
                "Put your books in the bag!",
                "I packed my bag",
                "img_school_bag",
                "cute 3d cartoon school bag with books, pixar style",
            ),
            Task::new(
                "Wear Uniform",
                "Put on your uniform!",
                "I am wearing my uniform",
                "img_uniform",
                "cute 3d cartoon boy wearing school uniform, pixar style",
            ),
            Task::new(
                "Wear Shoes",
                "Put on your shoes!",
                "I put on my shoes",
                "img_shoes",
                "cute 3d cartoon boy tying shoes, pixar style",
            ),
            Task::new(
                "Bus Waiting",
                "Wait for the school bus!",
                "I am waiting for the bus",
                "img_school_bus",
                "cute 3d cartoon yellow school bus arriving, pixar style",
            ),
        ],
    )
}

fn transportation() -> Routine {
    routine(
        "transport",
        "Transportation Routine",
        "transport",
        Some("animals"),
        vec![
            Task::new(
                "Car",
                "Say 'Car'!",
                "Car",
                "img_car",
                "cute 3d cartoon red car zooming, pixar style",
            ),
            Task::new(
                "Bus",
                "Say 'Bus'!",
                "Bus",
                "img_bus",
                "cute 3d cartoon yellow bus, pixar style",
            ),
            Task::new(
                "Train",
                "Say 'Choo Choo'!",
                "Choo Choo",
                "img_train",
                "cute 3d cartoon steam train puffing smoke, pixar style",
            ),
            Task::new(
                "Airplane",
                "Say 'Airplane'!",
                "Airplane",
                "img_airplane",
                "cute 3d cartoon airplane flying in clouds, pixar style",
            ),
        ],
    )
}

fn animals() -> Routine {
    routine(
        "animals",
        "Animals Routine",
        "animals",
        Some("birds"),
        vec![
            Task::new(
                "Dog",
                "What does a dog say?",
                "Woof woof",
                "img_dog",
                "cute 3d cartoon puppy dog wagging tail, pixar style",
            ),
            Task::new(
                "Cat",
                "What does a cat say?",
                "Meow",
                "img_cat",
                "cute 3d cartoon kitten playing with yarn, pixar style",
            ),
            Task::new(
                "Lion",
                "What does a lion say?",
                "Roar",
                "img_lion",
                "cute 3d cartoon lion with big mane, pixar style",
            ),
            Task::new(
                "Elephant",
                "Say 'Elephant'!",
                "Elephant",
                "img_elephant",
                "cute 3d cartoon elephant spraying water, pixar style",
            ),
        ],
    )
}

fn birds() -> Routine {
    routine(
        "birds",
        "Birds Routine",
        "birds",
        Some("shapes"),
        vec![
            Task::new(
                "Parrot",
                "Say 'Parrot'!",
                "Parrot",
                "img_parrot",
                "cute 3d colorful cartoon parrot, pixar style",
            ),
            Task::new(
                "Duck",
                "What does a duck say?",
                "Quack quack",
                "img_duck",
                "cute 3d cartoon duck in pond, pixar style",
            ),
            Task::new(
                "Owl",
                "What does an owl say?",
                "Hoot hoot",
                "img_owl",
                "cute 3d cartoon owl on tree branch night, pixar style",
            ),
            Task::new(
                "Peacock",
                "Say 'Peacock'!",
                "Peacock",
                "img_peacock",
                "cute 3d cartoon peacock showing feathers, pixar style",
            ),
        ],
    )
}

fn shapes() -> Routine {
    routine(
        "shapes",
        "Shapes Routine",
        "shapes",
        Some("hospital"),
        vec![
            Task::new(
                "Circle",
                "Find something round!",
                "Circle",
                "img_circle",
                "cute 3d colorful circle shape character smiling, pixar style",
            ),
            Task::new(
                "Square",
                "Say 'Square'!",
                "Square",
                "img_square",
                "cute 3d colorful square shape character, pixar style",
            ),
            Task::new(
                "Triangle",
                "Say 'Triangle'!",
                "Triangle",
                "img_triangle",
                "cute 3d colorful triangle shape character, pixar style",
            ),
            Task::new(
                "Star",
                "Say 'Twinkle Star'!",
                "Twinkle Star",
                "img_star",
                "cute 3d golden star glowing, pixar style",
            ),
        ],
    )
}

fn hospital() -> Routine {
    routine(
        "hospital",
        "Hospital Routine",
        "hospital",
        Some("marriage"),
        vec![
            Task::new(
                "Check In",
                "Wait at the desk!",
                "I am waiting nicely",
                "img_reception",
                "cute 3d cartoon hospital reception desk, friendly nurse, pixar style",
            ),
            Task::new(
                "Doctor Visit",
                "Say ahh for the doctor!",
                "Ahh",
                "img_doctor",
                "cute 3d cartoon doctor with stethoscope smiling, pixar style",
            ),
            Task::new(
                "Be Brave",
                "You are very brave!",
                "I am brave",
                "img_brave",
                "cute 3d cartoon boy flexing arm muscles, superhero cape reflection, pixar style",
            ),
            Task::new(
                "Get Sticker",
                "Collect your reward sticker!",
                "I got a sticker",
                "img_sticker",
                "cute 3d cartoon hand holding a star sticker, pixar style",
            ),
        ],
    )
}

fn marriage() -> Routine {
    routine(
        "marriage",
        "Marriage Routine",
        "marriage",
        None,
        vec![
            Task::new(
                "Wear Party Dress",
                "Put on your fancy dress!",
                "I am looking fancy",
                "img_party_dress",
                "cute 3d cartoon boy wearing suit or tuxedo for wedding, pixar style",
            ),
            Task::new(
                "Greet Guests",
                "Say hello to everyone!",
                "Hello everyone",
                "img_greet",
                "cute 3d cartoon boy waving hand happily at wedding, pixar style",
            ),
            Task::new(
                "Meet The Bride and Groom",
                "Say hi to the bride and groom!",
                "Hi bride and groom",
                "img_bride_groom",
                "cute 3d cartoon boy sitting on chair quietly, pixar style",
            ),
            Task::new(
                "Dance",
                "Dance to the music!",
                "I am dancing",
                "img_dance",
                "cute 3d cartoon boy dancing at a party, fun lighting, pixar style",
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_trimmed() {
        assert_eq!(get_routine("  Bedtime Routine ").key, "bedtime");
        assert_eq!(get_routine("BEDTIME").key, "bedtime");
        assert_eq!(get_routine("meal").key, "meal");
    }

    #[test]
    fn unknown_key_falls_back_to_morning() {
        assert_eq!(get_routine("does-not-exist").key, "morning");
        assert_eq!(get_routine("").key, "morning");
    }

    #[test]
    fn every_routine_has_tasks_with_expected_speech() {
        for r in all_routines() {
            assert!(!r.tasks.is_empty(), "{} has no tasks", r.key);
            for t in &r.tasks {
                assert!(!t.expected_speech.is_empty(), "{}: {}", r.key, t.title);
                assert!(!t.artwork_id.is_empty(), "{}: {}", r.key, t.title);
            }
        }
    }

    #[test]
    fn progression_chain_covers_catalog_and_terminates() {
        let routines = all_routines();
        // Walk the chain from morning and make sure it visits every routine
        // exactly once and ends at a routine with no successor.
        let mut seen = vec!["morning".to_string()];
        let mut current = get_routine("morning");
        while let Some(next) = current.unlocks_next.clone() {
            assert!(!seen.contains(&next), "cycle at {next}");
            seen.push(next.clone());
            current = get_routine(&next);
        }
        assert_eq!(seen.len(), routines.len());
    }
}
