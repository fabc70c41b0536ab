//! Static category/word content. The game content is a collaborator, not
//! part of the sync engine; it ships here so the demo and tests run against
//! real data.

pub struct Category {
    pub name: &'static str,
    pub words: &'static [&'static str],
}

pub const CATEGORIES: &[Category] = &[
    Category {
        name: "Animales",
        words: &[
            "Felinos",
            "Pájaros",
            "Animal que vuela",
            "Animal que vive en el agua",
            "Animal que es doméstico",
            "Animal que es salvaje",
            "Animal que es grande",
            "Animal que es pequeño",
            "Animal que corre rápido",
            "Animal que nada",
        ],
    },
    Category {
        name: "Países",
        words: &[
            "País de Europa",
            "País de América",
            "País de Asia",
            "País de África",
            "País de Oceanía",
            "País que habla español",
            "País que habla inglés",
            "País con playa",
            "País con montañas",
            "País grande",
        ],
    },
    Category {
        name: "Deportes",
        words: &[
            "Deporte con pelota",
            "Deporte acuático",
            "Deporte de invierno",
            "Deporte individual",
            "Deporte en equipo",
            "Deporte olímpico",
            "Deporte que se juega al aire libre",
            "Deporte de contacto",
            "Deporte con raqueta",
            "Deporte de velocidad",
        ],
    },
    Category {
        name: "Electrodomésticos",
        words: &[
            "Refrigerador",
            "Lavadora",
            "Secadora",
            "Microondas",
            "Horno",
            "Licuadora",
            "Batidora",
            "Cafetera",
            "Tostadora",
            "Aspiradora",
            "Plancha",
            "Ventilador",
            "Aire acondicionado",
            "Calefactor",
            "Televisor",
            "Radio",
            "Reproductor de DVD",
            "Lavavajillas",
            "Horno eléctrico",
        ],
    },
    Category {
        name: "Profesiones",
        words: &[
            "Profesión en educación",
            "Profesión en tecnología",
            "Profesión en salud",
            "Profesión en construcción",
            "Profesión creativa",
            "Profesión que trabaja con números",
            "Profesión que trabaja con personas",
            "Profesión que requiere estudios universitarios",
            "Profesión de servicio",
            "Profesión artística",
        ],
    },
    Category {
        name: "Conceptos de Matemática",
        words: &[
            "Número par",
            "Número impar",
            "Número primo",
            "Operación matemática",
            "Figura geométrica",
            "Unidad de medida",
            "Concepto de álgebra",
            "Concepto de geometría",
            "Fracción",
            "Porcentaje",
        ],
    },
    Category {
        name: "Películas",
        words: &[
            "Película de acción",
            "Película de comedia",
            "Película de ciencia ficción",
            "Película animada",
            "Película de terror",
            "Película de superhéroes",
            "Película de Disney",
            "Película de aventuras",
            "Película dramática",
            "Película de fantasía",
        ],
    },
    Category {
        name: "Lugares",
        words: &[
            "Lugar para estudiar",
            "Lugar para comer",
            "Lugar para comprar",
            "Lugar para trabajar",
            "Lugar para descansar",
            "Lugar público",
            "Lugar privado",
            "Lugar al aire libre",
            "Lugar techado",
            "Lugar de entretenimiento",
        ],
    },
];

/// Look up a category by exact name.
pub fn category(name: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.name == name)
}

pub fn category_names() -> impl Iterator<Item = &'static str> {
    CATEGORIES.iter().map(|c| c.name)
}
